//! Client-side cooked-mode line editor for Telnet linemode.
//!
//! [`LineEditor`] is the core: a `Vec<char>` buffer, char-index cursor,
//! word-boundary scan (`word_boundary`), and kill/yank operations
//! implementing the usual readline primitives (backspace, erase-word,
//! kill-line, cursor motion). [`ByteEditor`] is the byte-level front end
//! that decodes raw terminal input (control bytes and ANSI CSI
//! sequences) into calls on that core, and produces the redraw sequence
//! after each mutation.

// ── LineEditor ────────────────────────────────────────────────────────────

/// A readline-style line editor backed by a `Vec<char>`.
///
/// All positions are in Unicode scalar values (chars), not bytes.
#[derive(Debug, Clone)]
pub struct LineEditor {
    buffer: Vec<char>,
    /// Cursor position (0 = before first char, `buffer.len()` = after last).
    pub pos: usize,
    /// When `true`, typed characters overwrite rather than insert.
    pub insert_mode: bool,
    /// Extra characters treated as word-constituents.
    pub wordpunct: String,
    /// Last killed text, available for yanking.
    kill_ring: Vec<char>,
    cached_text: String,
    dirty: bool,
}

impl LineEditor {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            pos: 0,
            insert_mode: true,
            wordpunct: String::new(),
            kill_ring: Vec::new(),
            cached_text: String::new(),
            dirty: false,
        }
    }

    pub fn text_ref(&mut self) -> &str {
        if self.dirty {
            self.cached_text.clear();
            for &ch in &self.buffer {
                self.cached_text.push(ch);
            }
            self.dirty = false;
        }
        &self.cached_text
    }

    pub fn text(&mut self) -> String {
        self.text_ref().to_owned()
    }

    #[inline]
    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn chars(&self) -> &[char] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume and return the buffer contents, resetting the editor to empty.
    pub fn take_line(&mut self) -> String {
        let line = self.text_ref().to_owned();
        self.buffer.clear();
        self.pos = 0;
        self.cached_text.clear();
        self.dirty = false;
        line
    }

    pub fn set_text(&mut self, text: &str) {
        self.buffer = text.chars().collect();
        self.pos = self.buffer.len();
        self.mark_dirty();
    }

    pub fn insert_char(&mut self, ch: char) {
        if self.insert_mode || self.pos == self.buffer.len() {
            self.buffer.insert(self.pos, ch);
        } else {
            self.buffer[self.pos] = ch;
        }
        self.pos += 1;
        self.mark_dirty();
    }

    pub fn insert_str(&mut self, s: &str) {
        for ch in s.chars() {
            self.insert_char(ch);
        }
    }

    /// Delete the character immediately before the cursor (backspace).
    pub fn delete_before(&mut self) -> bool {
        if self.pos == 0 {
            return false;
        }
        self.pos -= 1;
        self.buffer.remove(self.pos);
        self.mark_dirty();
        true
    }

    /// Delete the character under the cursor (forward delete).
    pub fn delete_at(&mut self) -> bool {
        if self.pos >= self.buffer.len() {
            return false;
        }
        self.buffer.remove(self.pos);
        self.mark_dirty();
        true
    }

    pub fn move_left(&mut self, n: usize) {
        self.pos = self.pos.saturating_sub(n);
    }

    pub fn move_right(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buffer.len());
    }

    pub fn move_home(&mut self) {
        self.pos = 0;
    }

    pub fn move_end(&mut self) {
        self.pos = self.buffer.len();
    }

    /// Find the boundary of a word starting at `start`, moving in direction
    /// `dir` (+1 = forward, -1 = backward). Returns the char index of the
    /// far edge of the word.
    pub fn word_boundary(&self, start: usize, dir: i32) -> usize {
        let len = self.buffer.len();
        let stop: i64 = if dir < 0 { -1 } else { len as i64 };
        let mut place = start.min(len) as i64 - if dir < 0 { 1 } else { 0 };

        while place != stop && !self.is_word_char(place as usize) {
            place += dir as i64;
        }
        while place != stop && self.is_word_char(place as usize) {
            place += dir as i64;
        }

        if dir < 0 {
            (place + 1).max(0) as usize
        } else {
            place.min(len as i64) as usize
        }
    }

    pub fn move_word_forward(&mut self) {
        self.pos = self.word_boundary(self.pos, 1);
    }

    pub fn move_word_backward(&mut self) {
        self.pos = self.word_boundary(self.pos, -1);
    }

    pub fn kill_to_end(&mut self) {
        self.kill_ring = self.buffer[self.pos..].to_vec();
        self.buffer.truncate(self.pos);
        self.mark_dirty();
    }

    pub fn kill_to_start(&mut self) {
        self.kill_ring = self.buffer[..self.pos].to_vec();
        self.buffer.drain(..self.pos);
        self.pos = 0;
        self.mark_dirty();
    }

    pub fn kill_word_forward(&mut self) {
        let end = self.word_boundary(self.pos, 1);
        self.kill_ring = self.buffer[self.pos..end].to_vec();
        self.buffer.drain(self.pos..end);
        self.mark_dirty();
    }

    pub fn kill_word_backward(&mut self) {
        let start = self.word_boundary(self.pos, -1);
        self.kill_ring = self.buffer[start..self.pos].to_vec();
        self.buffer.drain(start..self.pos);
        self.pos = start;
        self.mark_dirty();
    }

    pub fn yank(&mut self) {
        let yanked = self.kill_ring.clone();
        for ch in yanked {
            self.buffer.insert(self.pos, ch);
            self.pos += 1;
        }
        self.mark_dirty();
    }

    pub fn kill_ring_text(&self) -> String {
        self.kill_ring.iter().collect()
    }

    fn is_word_char(&self, idx: usize) -> bool {
        let ch = self.buffer[idx];
        ch.is_alphanumeric() || self.wordpunct.contains(ch)
    }
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

// ── ByteEditor ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnsiState {
    None,
    Esc,
    Csi,
}

/// What a fed byte produced, separated by destination: bytes the local
/// terminal should see (echo/redraw) and bytes that should go out over
/// the Telnet stream (a committed line, or a raw passthrough byte).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedOutcome {
    pub local_echo: Vec<u8>,
    pub to_stream: Vec<u8>,
    pub eof: bool,
}

/// Byte-level front end over [`LineEditor`]: decodes raw terminal input
/// (control bytes, CSI escape sequences) into editing operations and
/// produces the redraw sequence after each mutation.
pub struct ByteEditor {
    editor: LineEditor,
    ansi: AnsiState,
    csi_params: Vec<u8>,
    last_rendered_len: usize,
}

impl ByteEditor {
    pub fn new() -> Self {
        Self {
            editor: LineEditor::new(),
            ansi: AnsiState::None,
            csi_params: Vec::new(),
            last_rendered_len: 0,
        }
    }

    pub fn editor(&self) -> &LineEditor {
        &self.editor
    }

    /// Redraw sequence: `\r`, buffer contents, padding to cover a shrunk
    /// tail, `\r`, then the prefix up to the cursor. `last_rendered_len`
    /// is a high-water mark, never decreasing, so a long line that gets
    /// progressively trimmed keeps being fully erased on every redraw.
    fn render(&mut self) -> Vec<u8> {
        let char_count = self.editor.len();
        let pad = self.last_rendered_len.saturating_sub(char_count);
        self.last_rendered_len = self.last_rendered_len.max(char_count);

        let mut out = Vec::new();
        out.push(b'\r');
        out.extend(self.editor.text().into_bytes());
        out.extend(std::iter::repeat(b' ').take(pad));
        out.push(b'\r');
        let prefix: String = self.editor.chars()[..self.editor.pos].iter().collect();
        out.extend(prefix.into_bytes());
        out
    }

    fn commit(&mut self, terminator: &[u8]) -> FeedOutcome {
        let line = self.editor.take_line();
        self.last_rendered_len = 0;
        let mut to_stream = line.into_bytes();
        to_stream.extend_from_slice(terminator);
        FeedOutcome {
            local_echo: terminator.to_vec(),
            to_stream,
            eof: false,
        }
    }

    /// Feed one raw input byte. Returns what happened: local echo bytes,
    /// bytes to forward to the stream, and whether an EOF condition was
    /// reached (Ctrl-D at end-of-line).
    pub fn feed_byte(&mut self, b: u8) -> FeedOutcome {
        match self.ansi {
            AnsiState::None => self.feed_byte_normal(b),
            AnsiState::Esc => self.feed_byte_esc(b),
            AnsiState::Csi => self.feed_byte_csi(b),
        }
    }

    fn redraw_outcome(&mut self) -> FeedOutcome {
        FeedOutcome {
            local_echo: self.render(),
            to_stream: Vec::new(),
            eof: false,
        }
    }

    fn feed_byte_normal(&mut self, b: u8) -> FeedOutcome {
        match b {
            b'\r' => self.commit(b"\r\n"),
            b'\n' => self.commit(b"\n"),
            0x7F | 0x08 => {
                self.editor.delete_before();
                self.redraw_outcome()
            }
            0x15 => {
                self.editor.kill_to_start();
                self.redraw_outcome()
            }
            0x17 => {
                self.editor.kill_word_backward();
                self.redraw_outcome()
            }
            0x01 => {
                self.editor.move_home();
                self.redraw_outcome()
            }
            0x05 => {
                self.editor.move_end();
                self.redraw_outcome()
            }
            0x02 => {
                self.editor.move_left(1);
                self.redraw_outcome()
            }
            0x06 => {
                self.editor.move_right(1);
                self.redraw_outcome()
            }
            0x19 => {
                self.editor.yank();
                self.redraw_outcome()
            }
            0x04 => self.feed_ctrl_d(),
            0x1B => {
                self.ansi = AnsiState::Esc;
                FeedOutcome::default()
            }
            _ if (0x20..0x7F).contains(&b) || b >= 0x80 => {
                // Printable ASCII, or a UTF-8 continuation/lead byte —
                // the engine feeds whole decoded chars in practice, but
                // this front end is byte-oriented, so non-ASCII bytes
                // are accumulated as Latin-1-ish chars rather than
                // risking a partial multi-byte sequence; full UTF-8
                // input assembly is the caller's job upstream of this
                // type if needed.
                self.editor.insert_char(b as char);
                self.redraw_outcome()
            }
            _ => {
                // Non-printable, non-editing byte: flush any pending
                // buffer as a committed line, then forward the byte raw.
                let mut outcome = if self.editor.is_empty() {
                    FeedOutcome::default()
                } else {
                    self.commit(b"\r\n")
                };
                outcome.to_stream.push(b);
                outcome
            }
        }
    }

    fn feed_ctrl_d(&mut self) -> FeedOutcome {
        if self.editor.pos < self.editor.len() {
            self.editor.delete_at();
            self.redraw_outcome()
        } else if !self.editor.is_empty() {
            let mut outcome = self.commit(b"\r\n");
            outcome.eof = true;
            outcome
        } else {
            FeedOutcome {
                local_echo: Vec::new(),
                to_stream: Vec::new(),
                eof: true,
            }
        }
    }

    fn feed_byte_esc(&mut self, b: u8) -> FeedOutcome {
        self.ansi = AnsiState::None;
        match b {
            b'[' => {
                self.ansi = AnsiState::Csi;
                self.csi_params.clear();
                FeedOutcome::default()
            }
            b'b' => {
                self.editor.move_word_backward();
                self.redraw_outcome()
            }
            b'f' => {
                self.editor.move_word_forward();
                self.redraw_outcome()
            }
            0x7F | 0x08 => {
                // ESC-Backspace: erase-word, same as Ctrl-W.
                self.editor.kill_word_backward();
                self.redraw_outcome()
            }
            _ => FeedOutcome::default(),
        }
    }

    fn feed_byte_csi(&mut self, b: u8) -> FeedOutcome {
        if b.is_ascii_digit() {
            self.csi_params.push(b);
            return FeedOutcome::default();
        }
        self.ansi = AnsiState::None;
        match b {
            b'C' => {
                self.editor.move_right(1);
                self.redraw_outcome()
            }
            b'D' => {
                self.editor.move_left(1);
                self.redraw_outcome()
            }
            b'H' => {
                self.editor.move_home();
                self.redraw_outcome()
            }
            b'F' => {
                self.editor.move_end();
                self.redraw_outcome()
            }
            b'~' => match self.csi_params.as_slice() {
                b"1" | b"7" => {
                    self.editor.move_home();
                    self.redraw_outcome()
                }
                b"3" => {
                    self.editor.delete_at();
                    self.redraw_outcome()
                }
                b"4" | b"8" => {
                    self.editor.move_end();
                    self.redraw_outcome()
                }
                _ => FeedOutcome::default(),
            },
            // 'A'/'B' (Up/Down) have no meaning in a single-line editor.
            _ => FeedOutcome::default(),
        }
    }
}

impl Default for ByteEditor {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── LineEditor core ───────────────────────────────────────────────

    #[test]
    fn insert_builds_text() {
        let mut ed = LineEditor::new();
        ed.insert_str("hello");
        assert_eq!(ed.text(), "hello");
        assert_eq!(ed.pos, 5);
    }

    #[test]
    fn insert_at_middle() {
        let mut ed = LineEditor::new();
        ed.insert_str("hllo");
        ed.move_left(3);
        ed.insert_char('e');
        assert_eq!(ed.text(), "hello");
        assert_eq!(ed.pos, 2);
    }

    #[test]
    fn overwrite_mode() {
        let mut ed = LineEditor::new();
        ed.insert_mode = false;
        ed.insert_str("hello");
        ed.move_home();
        ed.insert_char('H');
        assert_eq!(ed.text(), "Hello");
    }

    #[test]
    fn delete_before_at_start_returns_false() {
        let mut ed = LineEditor::new();
        ed.insert_str("hi");
        ed.move_home();
        assert!(!ed.delete_before());
    }

    #[test]
    fn kill_to_start_and_end() {
        let mut ed = LineEditor::new();
        ed.insert_str("hello world");
        ed.move_left(5);
        ed.kill_to_start();
        assert_eq!(ed.text(), "world");
        assert_eq!(ed.kill_ring_text(), "hello ");
    }

    #[test]
    fn kill_word_backward() {
        let mut ed = LineEditor::new();
        ed.insert_str("hello world");
        ed.kill_word_backward();
        assert_eq!(ed.kill_ring_text(), "world");
        assert_eq!(ed.text(), "hello ");
    }

    #[test]
    fn unicode_insert_and_delete() {
        let mut ed = LineEditor::new();
        ed.insert_str("héllo");
        assert_eq!(ed.len(), 5);
        ed.delete_before();
        assert_eq!(ed.text(), "héll");
    }

    // ── ByteEditor ────────────────────────────────────────────────────

    fn feed_str(ed: &mut ByteEditor, s: &str) -> Vec<FeedOutcome> {
        s.bytes().map(|b| ed.feed_byte(b)).collect()
    }

    #[test]
    fn printable_bytes_are_echoed_and_buffered() {
        let mut ed = ByteEditor::new();
        feed_str(&mut ed, "hi");
        assert_eq!(ed.editor().text_ref(), "hi");
    }

    #[test]
    fn cr_commits_with_crlf_terminator() {
        let mut ed = ByteEditor::new();
        feed_str(&mut ed, "hi");
        let outcome = ed.feed_byte(b'\r');
        assert_eq!(outcome.to_stream, b"hi\r\n");
        assert_eq!(outcome.local_echo, b"\r\n");
        assert!(ed.editor().is_empty());
    }

    #[test]
    fn lf_commits_with_lf_terminator() {
        let mut ed = ByteEditor::new();
        feed_str(&mut ed, "hi");
        let outcome = ed.feed_byte(b'\n');
        assert_eq!(outcome.to_stream, b"hi\n");
    }

    #[test]
    fn backspace_deletes_and_redraws() {
        let mut ed = ByteEditor::new();
        feed_str(&mut ed, "hi");
        let outcome = ed.feed_byte(0x7F);
        assert_eq!(ed.editor().text_ref(), "h");
        assert_eq!(outcome.local_echo, b"\rh \r h");
    }

    #[test]
    fn ctrl_u_kills_to_start() {
        let mut ed = ByteEditor::new();
        feed_str(&mut ed, "hello");
        ed.feed_byte(0x15);
        assert!(ed.editor().is_empty());
    }

    #[test]
    fn ctrl_d_at_end_of_empty_line_signals_eof() {
        let mut ed = ByteEditor::new();
        let outcome = ed.feed_byte(0x04);
        assert!(outcome.eof);
        assert!(outcome.to_stream.is_empty());
    }

    #[test]
    fn ctrl_d_at_end_of_nonempty_line_commits_then_eof() {
        let mut ed = ByteEditor::new();
        feed_str(&mut ed, "hi");
        let outcome = ed.feed_byte(0x04);
        assert!(outcome.eof);
        assert_eq!(outcome.to_stream, b"hi\r\n");
    }

    #[test]
    fn ctrl_d_mid_line_deletes_forward() {
        let mut ed = ByteEditor::new();
        feed_str(&mut ed, "hi");
        ed.editor.move_home();
        let outcome = ed.feed_byte(0x04);
        assert!(!outcome.eof);
        assert_eq!(ed.editor().text_ref(), "i");
    }

    #[test]
    fn csi_arrow_keys_move_cursor() {
        let mut ed = ByteEditor::new();
        feed_str(&mut ed, "hi");
        ed.feed_byte(0x1B);
        ed.feed_byte(b'[');
        ed.feed_byte(b'D'); // left
        assert_eq!(ed.editor().pos, 1);
    }

    #[test]
    fn csi_delete_tilde_deletes_at_cursor() {
        let mut ed = ByteEditor::new();
        feed_str(&mut ed, "hi");
        ed.editor.move_home();
        ed.feed_byte(0x1B);
        ed.feed_byte(b'[');
        ed.feed_byte(b'3');
        ed.feed_byte(b'~');
        assert_eq!(ed.editor().text_ref(), "i");
    }

    #[test]
    fn esc_b_and_f_move_by_word() {
        let mut ed = ByteEditor::new();
        feed_str(&mut ed, "hello world");
        ed.feed_byte(0x1B);
        ed.feed_byte(b'b');
        assert_eq!(ed.editor().pos, 6);
        ed.feed_byte(0x1B);
        ed.feed_byte(b'f');
        assert_eq!(ed.editor().pos, 11);
    }

    #[test]
    fn non_printable_byte_flushes_buffer_then_forwards_raw() {
        let mut ed = ByteEditor::new();
        feed_str(&mut ed, "hi");
        let outcome = ed.feed_byte(0x00);
        assert_eq!(outcome.to_stream, b"hi\r\n\x00");
        assert!(ed.editor().is_empty());
    }

    #[test]
    fn redraw_pads_to_historical_max_length() {
        let mut ed = ByteEditor::new();
        feed_str(&mut ed, "hello world"); // len 11, last_rendered_len -> 11
        for _ in 0..6 {
            ed.feed_byte(0x7F); // back to "hello", len 5
        }
        let outcome = ed.feed_byte(0x7F); // "hell", len 4
        // pad should cover the historical max (11) minus current len (4) = 7
        let expected: Vec<u8> = {
            let mut v = b"\rhell".to_vec();
            v.extend(std::iter::repeat(b' ').take(7));
            v.push(b'\r');
            v.extend(b"hell");
            v
        };
        assert_eq!(outcome.local_echo, expected);
    }
}
