// Line protocol transport to the peripheral server
//
// Outgoing:  "<verb> <id> <resource> <args>\n" on the shared command connection
// Incoming:  per-peripheral data connection carrying both streamed records
//            (terminated by '\n') and command acknowledgements (terminated by '\\')

use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, RawFd};

use tracing::trace;

use crate::error::{Result, RobotError};

/// Verb that writes a peripheral resource
pub const SET_VERB: &str = "dpset";
/// Verb that subscribes to a peripheral resource
pub const CAT_VERB: &str = "dpcat";

const ACK_TERMINATOR: u8 = b'\\';
const RECORD_TERMINATOR: u8 = b'\n';

/// Open one connection to the peripheral server
pub fn connect(addr: &str) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).map_err(|source| RobotError::Connect {
        op: "connect",
        source,
    })?;
    // Commands are single short lines; don't let Nagle batch them
    stream
        .set_nodelay(true)
        .map_err(|source| RobotError::Connect {
            op: "connect",
            source,
        })?;
    Ok(stream)
}

/// Format one command line
pub fn format_command(verb: &str, id: &str, resource: &str, args: &str) -> String {
    if args.is_empty() {
        format!("{} {} {}\n", verb, id, resource)
    } else {
        format!("{} {} {} {}\n", verb, id, resource, args)
    }
}

/// Write a full line in a single write call; a short write is fatal
fn write_line(sink: &mut dyn Write, line: &str, op: &'static str) -> Result<()> {
    let written = sink.write(line.as_bytes()).map_err(|e| RobotError::Write {
        op,
        detail: e.to_string(),
    })?;
    if written != line.len() {
        return Err(RobotError::Write {
            op,
            detail: format!("wrote {} of {} bytes", written, line.len()),
        });
    }
    sink.flush().map_err(|e| RobotError::Write {
        op,
        detail: e.to_string(),
    })
}

/// Handle on the shared command connection
pub struct CommandLink {
    sink: Box<dyn Write>,
}

impl CommandLink {
    pub fn new(sink: Box<dyn Write>) -> Self {
        Self { sink }
    }

    /// Clone a handle onto an already-open command connection
    pub fn tcp(stream: &TcpStream) -> Result<Self> {
        let clone = stream.try_clone().map_err(|source| RobotError::Connect {
            op: "CommandLink",
            source,
        })?;
        Ok(Self::new(Box::new(clone)))
    }

    pub fn send_command(&mut self, verb: &str, id: &str, resource: &str, args: &str) -> Result<()> {
        let line = format_command(verb, id, resource, args);
        trace!("-> {}", line.trim_end());
        write_line(self.sink.as_mut(), &line, "WriteCommand")
    }

    /// Shorthand for a `dpset` command
    pub fn set(&mut self, id: &str, resource: &str, args: &str) -> Result<()> {
        self.send_command(SET_VERB, id, resource, args)
    }
}

/// One framed unit read off a data connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Streamed sensor data
    Data(String),
    /// Acknowledgement of a command
    Ack(String),
}

/// Per-peripheral data connection
pub struct DataStream {
    reader: BufReader<Box<dyn Read>>,
    writer: Box<dyn Write>,
    fd: Option<RawFd>,
}

impl DataStream {
    pub fn new(reader: Box<dyn Read>, writer: Box<dyn Write>, fd: Option<RawFd>) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            fd,
        }
    }

    /// Open a dedicated data connection to the peripheral server
    pub fn tcp(addr: &str) -> Result<Self> {
        let stream = connect(addr)?;
        let reader = stream.try_clone().map_err(|source| RobotError::Connect {
            op: "DataStream",
            source,
        })?;
        let fd = stream.as_raw_fd();
        Ok(Self::new(Box::new(reader), Box::new(stream), Some(fd)))
    }

    /// Descriptor to watch for readability, if backed by a socket
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.fd
    }

    /// Ask the server to stream `resource` on this connection
    pub fn start_stream(&mut self, id: &str, resource: &str) -> Result<()> {
        let line = format_command(CAT_VERB, id, resource, "");
        trace!("-> {}", line.trim_end());
        write_line(self.writer.as_mut(), &line, "StartDataStream")
    }

    /// Bytes already pulled off the connection but not yet framed
    pub fn has_buffered(&self) -> bool {
        !self.reader.buffer().is_empty()
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => {
                    return Err(RobotError::Read {
                        op: "ReadResponse",
                        detail: "connection closed by peer".to_string(),
                    });
                }
                Ok(_) => return Ok(byte[0]),
                Err(e) if is_transient(&e) => continue,
                Err(e) => {
                    return Err(RobotError::Read {
                        op: "ReadResponse",
                        detail: e.to_string(),
                    });
                }
            }
        }
    }

    /// Read one record or acknowledgement
    ///
    /// A '\n' ends a data record unless the byte after it is a '\\', in which
    /// case the newline belongs to an acknowledgement. A '\\' ends an
    /// acknowledgement. Only bytes already received are inspected for the
    /// lookahead; the read never blocks to decide. At most `max_len` bytes,
    /// terminator included, are consumed before giving up with a read error.
    pub fn read_record(&mut self, max_len: usize) -> Result<Record> {
        let mut line = Vec::with_capacity(max_len);
        for _ in 0..max_len {
            match self.read_byte()? {
                RECORD_TERMINATOR => {
                    if self.reader.buffer().first() == Some(&ACK_TERMINATOR) {
                        line.push(RECORD_TERMINATOR);
                        continue;
                    }
                    return Ok(Record::Data(String::from_utf8_lossy(&line).into_owned()));
                }
                ACK_TERMINATOR => {
                    if line.last() == Some(&RECORD_TERMINATOR) {
                        line.pop();
                    }
                    return Ok(Record::Ack(String::from_utf8_lossy(&line).into_owned()));
                }
                byte => line.push(byte),
            }
        }
        Err(RobotError::Read {
            op: "ReadResponse",
            detail: format!("no terminator within {} bytes", max_len),
        })
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock)
}
