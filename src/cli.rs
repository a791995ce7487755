//! Command-line argument parsing.
//!
//! Manual iteration over `argv`: short flags combined in one `-abc`
//! argument with an embedded-or-separate value convention for the ones
//! that take one (`-p<port>` or `-p <port>`), long `--flag [value]`
//! options handled separately. No validation beyond what's needed to
//! populate [`Config`] and a connect target.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;

/// How to reach (or listen for) the peer.
#[derive(Debug, Clone)]
pub enum Target {
    /// `host:port` over TCP (or UDP/SCTP per `transport`).
    HostPort(String, u16),
    /// A Unix domain socket path.
    Unix(PathBuf),
}

/// Transport selection, orthogonal to [`Target`] (SCTP/UDP only make
/// sense with `HostPort`; Unix sockets ignore this field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
    Sctp,
}

/// TLS/DTLS selection, independent of `Transport` (DTLS implies UDP).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    None,
    Tls,
    Dtls,
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub listen: bool,
    pub target: Option<Target>,
    pub transport: Transport,
    pub encryption: Encryption,
    /// Local address to bind (listen mode) or source from (client mode).
    pub source_addr: Option<IpAddr>,
    /// Local port to bind/source from.
    pub source_port: Option<u16>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub verbose: bool,
    /// The engine configuration options this parser actually knows how
    /// to set.
    pub config: Config,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            listen: false,
            target: None,
            transport: Transport::Tcp,
            encryption: Encryption::None,
            source_addr: None,
            source_port: None,
            tls_cert: None,
            tls_key: None,
            verbose: false,
            config: Config::default(),
        }
    }
}

pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(&raw[1..])
}

pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut unix_path: Option<PathBuf> = None;
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        if let Some(long) = arg.strip_prefix("--") {
            let (name, inline_val) = match long.split_once('=') {
                Some((n, v)) => (n, Some(v.to_owned())),
                None => (long, None),
            };
            let mut take_value = |i: &mut usize| -> Result<String, String> {
                if let Some(v) = inline_val.clone() {
                    return Ok(v);
                }
                *i += 1;
                argv.get(*i)
                    .cloned()
                    .ok_or_else(|| format!("--{name} requires a value"))
            };
            match name {
                "listen" => args.listen = true,
                "udp" => args.transport = Transport::Udp,
                "sctp" => args.transport = Transport::Sctp,
                "unix" => unix_path = Some(PathBuf::from(take_value(&mut i)?)),
                "tls" => args.encryption = Encryption::Tls,
                "dtls" => {
                    args.encryption = Encryption::Dtls;
                    args.transport = Transport::Udp;
                }
                "tls-cert" => args.tls_cert = Some(PathBuf::from(take_value(&mut i)?)),
                "tls-key" => args.tls_key = Some(PathBuf::from(take_value(&mut i)?)),
                "source" => {
                    let v = take_value(&mut i)?;
                    args.source_addr = Some(
                        v.parse()
                            .map_err(|_| format!("invalid --source address: {v}"))?,
                    );
                }
                "source-port" => {
                    let v = take_value(&mut i)?;
                    args.source_port =
                        Some(v.parse().map_err(|_| format!("invalid --source-port: {v}"))?);
                }
                "send-only" => args.config.send_only = true,
                "recv-only" => args.config.recv_only = true,
                "crlf" => args.config.crlf = true,
                "delay" => {
                    let v = take_value(&mut i)?;
                    args.config.delay_ms =
                        v.parse().map_err(|_| format!("invalid --delay: {v}"))?;
                }
                "timeout" => {
                    let v = take_value(&mut i)?;
                    let secs: u64 = v.parse().map_err(|_| format!("invalid --timeout: {v}"))?;
                    args.config.idle_timeout = Some(Duration::from_secs(secs));
                }
                "close-on-eof" => args.config.close_on_eof = true,
                "no-shutdown" => args.config.no_shutdown = true,
                "hex-dump" => args.config.hex_dump = true,
                "hex-dump-file" => {
                    args.config.hex_dump_path = Some(PathBuf::from(take_value(&mut i)?))
                }
                "output" => args.config.output_path = Some(PathBuf::from(take_value(&mut i)?)),
                "append" => args.config.output_append = true,
                "telnet" => args.config.telnet = true,
                "telnet-edit" => {
                    args.config.telnet = true;
                    args.config.telnet_edit_mode = true;
                }
                "telnet-signal" => {
                    args.config.telnet = true;
                    args.config.telnet_signal_translation = true;
                }
                "term-type" => args.config.term_type = take_value(&mut i)?,
                "window" => {
                    let v = take_value(&mut i)?;
                    let (w, h) = v
                        .split_once('x')
                        .ok_or_else(|| format!("--window expects WxH, got {v}"))?;
                    args.config.window_size = (
                        w.parse().map_err(|_| format!("invalid window width: {w}"))?,
                        h.parse()
                            .map_err(|_| format!("invalid window height: {h}"))?,
                    );
                }
                "verbose" => args.verbose = true,
                other => return Err(format!("unknown option --{other}")),
            }
            i += 1;
            continue;
        }

        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        // Short flags, possibly combined (`-luv`), with `-p<port>` /
        // `-p <port>` both accepted for the value-taking ones.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'l' => args.listen = true,
                'u' => args.transport = Transport::Udp,
                'v' => args.verbose = true,
                'q' => args.config.close_on_eof = true,
                'C' => args.config.crlf = true,

                'p' => {
                    let val = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-p requires a port argument".to_owned());
                    };
                    args.source_port =
                        Some(val.parse().map_err(|_| format!("invalid -p port: {val}"))?);
                }
                's' => {
                    let val = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-s requires an address argument".to_owned());
                    };
                    args.source_addr = Some(
                        val.parse()
                            .map_err(|_| format!("invalid -s address: {val}"))?,
                    );
                }
                'w' => {
                    let val = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-w requires a seconds argument".to_owned());
                    };
                    let secs: u64 = val.parse().map_err(|_| format!("invalid -w value: {val}"))?;
                    args.config.idle_timeout = Some(Duration::from_secs(secs));
                }
                'i' => {
                    let val = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-i requires a milliseconds argument".to_owned());
                    };
                    args.config.delay_ms =
                        val.parse().map_err(|_| format!("invalid -i value: {val}"))?;
                }
                'o' => {
                    let val = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-o requires a path argument".to_owned());
                    };
                    args.config.output_path = Some(PathBuf::from(val));
                }
                'x' => {
                    let val = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-x requires a path argument".to_owned());
                    };
                    args.config.hex_dump_path = Some(PathBuf::from(val));
                }

                c => return Err(format!("illegal option -- {c}")),
            }
            j += 1;
        }
        i += 1;
    }

    if let Some(path) = unix_path {
        args.target = Some(Target::Unix(path));
    } else {
        match positional.len() {
            0 => {}
            1 => {
                let port: u16 = positional[0]
                    .parse()
                    .map_err(|_| format!("invalid port number: {}", positional[0]))?;
                let host = if args.listen { "0.0.0.0" } else { "127.0.0.1" };
                args.target = Some(Target::HostPort(host.to_owned(), port));
            }
            2 => {
                let host = positional[0].clone();
                let port: u16 = positional[1]
                    .parse()
                    .map_err(|_| format!("invalid port number: {}", positional[1]))?;
                args.target = Some(Target::HostPort(host, port));
            }
            n => return Err(format!("too many arguments ({n})")),
        }
    }

    if args.target.is_none() {
        return Err("missing target: specify <host> <port>, <port>, or --unix <path>".to_owned());
    }
    if matches!(args.encryption, Encryption::Dtls) && args.transport != Transport::Udp {
        return Err("--dtls requires UDP transport".to_owned());
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn host_and_port() {
        let a = parse_argv(&argv(&["example.com", "4000"])).unwrap();
        assert!(matches!(&a.target, Some(Target::HostPort(h, 4000)) if h == "example.com"));
    }

    #[test]
    fn port_only_implies_localhost() {
        let a = parse_argv(&argv(&["4000"])).unwrap();
        assert!(matches!(&a.target, Some(Target::HostPort(h, 4000)) if h == "127.0.0.1"));
    }

    #[test]
    fn listen_port_only_binds_all_interfaces() {
        let a = parse_argv(&argv(&["-l", "4000"])).unwrap();
        assert!(a.listen);
        assert!(matches!(&a.target, Some(Target::HostPort(h, 4000)) if h == "0.0.0.0"));
    }

    #[test]
    fn combined_short_flags() {
        let a = parse_argv(&argv(&["-luv", "4000"])).unwrap();
        assert!(a.listen);
        assert_eq!(a.transport, Transport::Udp);
        assert!(a.verbose);
    }

    #[test]
    fn embedded_port_value() {
        let a = parse_argv(&argv(&["-p2222", "host", "4000"])).unwrap();
        assert_eq!(a.source_port, Some(2222));
    }

    #[test]
    fn separate_port_value() {
        let a = parse_argv(&argv(&["-p", "2222", "host", "4000"])).unwrap();
        assert_eq!(a.source_port, Some(2222));
    }

    #[test]
    fn unix_socket_target_ignores_host_port() {
        let a = parse_argv(&argv(&["--unix", "/tmp/s.sock"])).unwrap();
        assert!(matches!(&a.target, Some(Target::Unix(p)) if p == &PathBuf::from("/tmp/s.sock")));
    }

    #[test]
    fn long_flags_set_engine_config() {
        let a = parse_argv(&argv(&[
            "--crlf",
            "--send-only",
            "--delay=50",
            "--telnet-edit",
            "host",
            "23",
        ]))
        .unwrap();
        assert!(a.config.crlf);
        assert!(a.config.send_only);
        assert_eq!(a.config.delay_ms, 50);
        assert!(a.config.telnet && a.config.telnet_edit_mode);
    }

    #[test]
    fn window_flag_parses_wxh() {
        let a = parse_argv(&argv(&["--window", "132x43", "host", "23"])).unwrap();
        assert_eq!(a.config.window_size, (132, 43));
    }

    #[test]
    fn dtls_requires_udp() {
        assert!(parse_argv(&argv(&["--dtls", "--sctp", "host", "4000"])).is_err());
    }

    #[test]
    fn missing_target_is_an_error() {
        assert!(parse_argv(&argv(&["-v"])).is_err());
    }

    #[test]
    fn unknown_long_flag_is_an_error() {
        assert!(parse_argv(&argv(&["--bogus", "host", "1"])).is_err());
    }

    #[test]
    fn too_many_positional_is_an_error() {
        assert!(parse_argv(&argv(&["a", "b", "c"])).is_err());
    }
}
