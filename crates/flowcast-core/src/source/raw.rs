//! AF_PACKET capture
//!
//! Raw link-layer socket receiving every EtherType, optionally bound to one
//! interface. Requires CAP_NET_RAW. Promiscuous mode is left to the
//! operator.

use super::FrameSource;
use crate::error::{FlowcastError, Result};
use crate::packet::RawFrame;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Receive buffer per frame
pub const MAX_FRAME_LEN: usize = 65535;

const ETH_P_ALL: u16 = 0x0003;

/// Poll interval while waiting for traffic
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Raw socket frame source
pub struct RawSocketSource {
    socket: Socket,
    interface: Option<String>,
    buf: Vec<u8>,
    running: Option<Arc<AtomicBool>>,
}

impl RawSocketSource {
    /// Open a capture socket, bound to `interface` when given
    pub fn open(interface: Option<&str>) -> Result<Self> {
        let protocol = Protocol::from(i32::from(ETH_P_ALL.to_be()));
        let socket = Socket::new(Domain::PACKET, Type::RAW, Some(protocol)).map_err(|e| {
            FlowcastError::Capture(format!("opening raw socket (needs CAP_NET_RAW): {e}"))
        })?;

        if let Some(name) = interface {
            socket
                .bind_device(Some(name.as_bytes()))
                .map_err(|e| FlowcastError::Capture(format!("binding to {name}: {e}")))?;
        }
        socket.set_read_timeout(Some(READ_TIMEOUT))?;

        info!(interface = interface.unwrap_or("any"), "raw capture socket open");
        Ok(Self {
            socket,
            interface: interface.map(str::to_string),
            buf: vec![0u8; MAX_FRAME_LEN],
            running: None,
        })
    }

    fn stopped(&self) -> bool {
        self.running
            .as_ref()
            .map_or(false, |r| !r.load(Ordering::Relaxed))
    }
}

impl FrameSource for RawSocketSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        loop {
            if self.stopped() {
                return Ok(None);
            }
            match self.socket.read(&mut self.buf) {
                Ok(n) => return Ok(Some(RawFrame::now(self.buf[..n].to_vec()))),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(FlowcastError::Capture(format!("recv failed: {e}"))),
            }
        }
    }

    fn attach_shutdown(&mut self, running: Arc<AtomicBool>) {
        self.running = Some(running);
    }

    fn describe(&self) -> String {
        format!("af_packet:{}", self.interface.as_deref().unwrap_or("any"))
    }
}
