//! Line-oriented TCP remote-control front-end.
//!
//! One accept thread, one thread per client. A client sends one command
//! per line (whitespace-separated, double quotes group words) and gets one
//! JSON document per line back. Commands that wait (the idle `notify`)
//! simply block the client's thread until the response is ready.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use crate::services::commands::CommandDispatcher;

const GREETING: &str = concat!("OK jukeboxd ", env!("CARGO_PKG_VERSION"), "\n");

/// Bind and start serving. Returns the bound address once the accept
/// thread is running.
pub fn serve(
    address: &str,
    port: u16,
    dispatcher: Arc<CommandDispatcher>,
) -> std::io::Result<std::net::SocketAddr> {
    let listener = TcpListener::bind((address, port))?;
    let local_addr = listener.local_addr()?;
    tracing::info!("listening on {}", local_addr);

    std::thread::Builder::new()
        .name("interface-accept".to_string())
        .spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let dispatcher = dispatcher.clone();
                        let peer = stream
                            .peer_addr()
                            .map(|a| a.to_string())
                            .unwrap_or_else(|_| "?".to_string());
                        if let Err(e) = std::thread::Builder::new()
                            .name(format!("interface-{}", peer))
                            .spawn(move || client_loop(stream, dispatcher))
                        {
                            tracing::warn!("failed to spawn client thread: {}", e);
                        }
                    }
                    Err(e) => tracing::warn!("accept failed: {}", e),
                }
            }
        })?;

    Ok(local_addr)
}

fn client_loop(stream: TcpStream, dispatcher: Arc<CommandDispatcher>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".to_string());
    tracing::info!("connection from {}", peer);

    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(e) => {
            tracing::warn!("cannot clone client stream: {}", e);
            return;
        }
    };
    if writer.write_all(GREETING.as_bytes()).is_err() {
        return;
    }

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("read from {} failed: {}", peer, e);
                break;
            }
        }

        let mut args = split_arguments(&line);
        if args.is_empty() {
            continue;
        }
        let name = args.remove(0);
        tracing::debug!("{} -> {} {:?}", peer, name, args);

        let response = match dispatcher.dispatch_blocking(&name, &args) {
            Ok(value) => value,
            Err(e) => e.to_response(),
        };
        let mut text = response.to_string();
        text.push('\n');
        if writer.write_all(text.as_bytes()).is_err() {
            break;
        }
    }

    tracing::info!("connection from {} closed", peer);
}

/// Split a command line into arguments. Double quotes group words when they
/// open a token; a quote in the middle of a word is a literal character.
/// `""` is a valid empty argument.
fn split_arguments(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut inside_quotes = false;
    let mut inside_word = false;

    for c in line.chars() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                if inside_quotes {
                    current.push(c);
                } else if inside_word {
                    args.push(std::mem::take(&mut current));
                    inside_word = false;
                }
            }
            '"' => {
                if inside_quotes {
                    args.push(std::mem::take(&mut current));
                    inside_quotes = false;
                } else if !inside_word {
                    inside_quotes = true;
                } else {
                    current.push(c);
                }
            }
            _ => {
                if !inside_quotes {
                    inside_word = true;
                }
                current.push(c);
            }
        }
    }
    if inside_word || inside_quotes {
        args.push(current);
    }
    args
}
