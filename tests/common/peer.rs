//! A minimal synchronous line-oriented TCP peer, standing in for the
//! remote IRCd side of an S2S link in black-box tests.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

pub struct Peer {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Peer {
    pub fn new(stream: TcpStream) -> Self {
        let reader_half = stream.try_clone().expect("clone tcp stream for reading");
        Self { writer: stream, reader: BufReader::new(reader_half) }
    }

    pub fn send_line(&mut self, line: &str) {
        write!(self.writer, "{line}\r\n").expect("write to peer socket");
        self.writer.flush().expect("flush peer socket");
    }

    /// Read one line, stripped of its trailing CRLF/LF, or `None` on EOF or
    /// if nothing arrives within `timeout`.
    pub fn read_line(&mut self, timeout: Duration) -> Option<String> {
        self.reader.get_ref().set_read_timeout(Some(timeout)).ok()?;
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(_) => None,
        }
    }
}
