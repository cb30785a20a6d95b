// CAN channel abstraction
//
// A Bus serializes frames onto one physical channel. Heartbeat and drive
// traffic share it, so each send holds the channel lock for exactly one frame.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use super::frame::Frame;

/// Something that can put one addressed frame on the wire
pub trait FrameTransport: Send {
    fn transmit(&mut self, address: u16, frame: &Frame) -> io::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Transport on {bus} down while sending to 0x{address:03X}: {source}")]
    TransportDown {
        bus: String,
        address: u16,
        #[source]
        source: io::Error,
    },

    #[error("Bus {bus} is closed")]
    Closed { bus: String },

    #[error("Failed to open bus {bus}: {source}")]
    Open {
        bus: String,
        #[source]
        source: io::Error,
    },
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One physical channel shared by several motor nodes
pub struct Bus {
    name: String,
    transport: Mutex<Option<Box<dyn FrameTransport>>>,
}

impl Bus {
    pub fn new(name: impl Into<String>, transport: impl FrameTransport + 'static) -> Self {
        Self {
            name: name.into(),
            transport: Mutex::new(Some(Box::new(transport))),
        }
    }

    /// Open a SocketCAN interface (e.g. "can0")
    #[cfg(feature = "socketcan")]
    pub fn open_socketcan(ifname: &str) -> Result<Self, BusError> {
        info!("Opening CAN bus on {}", ifname);
        let transport = SocketCanTransport::open(ifname).map_err(|source| BusError::Open {
            bus: ifname.to_string(),
            source,
        })?;
        Ok(Self::new(ifname, transport))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transmit one frame to `address`. Atomic per frame; never retried here.
    pub fn send(&self, address: u16, frame: &Frame) -> Result<(), BusError> {
        let mut transport = lock(&self.transport);
        let transport = transport.as_mut().ok_or_else(|| BusError::Closed {
            bus: self.name.clone(),
        })?;

        transport
            .transmit(address, frame)
            .map_err(|source| BusError::TransportDown {
                bus: self.name.clone(),
                address,
                source,
            })?;

        debug!("[{}] 0x{:03X}: {}", self.name, address, frame);
        Ok(())
    }

    /// Release the transport. Later sends fail with `BusError::Closed`.
    pub fn close(&self) {
        if lock(&self.transport).take().is_some() {
            info!("Closed bus {}", self.name);
        }
    }

    pub fn is_open(&self) -> bool {
        lock(&self.transport).is_some()
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .finish()
    }
}

/// A frame as seen by the loopback transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentFrame {
    pub address: u16,
    pub frame: Frame,
}

#[derive(Default)]
struct LoopbackLog {
    frames: Vec<SentFrame>,
    stream: Vec<u8>,
}

/// In-memory transport for simulation and tests.
///
/// Clones share the same log, so a test can keep one handle while the
/// bus owns another.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    log: Arc<Mutex<LoopbackLog>>,
    failing: Arc<AtomicBool>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following transmit fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every frame transmitted so far
    pub fn sent(&self) -> Vec<SentFrame> {
        lock(&self.log).frames.clone()
    }

    /// Raw bytes in transmission order
    pub fn stream(&self) -> Vec<u8> {
        lock(&self.log).stream.clone()
    }

    pub fn clear(&self) {
        let mut log = lock(&self.log);
        log.frames.clear();
        log.stream.clear();
    }
}

impl FrameTransport for LoopbackTransport {
    fn transmit(&mut self, address: u16, frame: &Frame) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "loopback transport down",
            ));
        }

        let mut log = lock(&self.log);
        log.stream.extend_from_slice(frame.as_bytes());
        log.frames.push(SentFrame {
            address,
            frame: *frame,
        });
        Ok(())
    }
}

#[cfg(feature = "socketcan")]
pub use self::socket::SocketCanTransport;

#[cfg(feature = "socketcan")]
mod socket {
    use std::io;

    use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Socket, StandardId};

    use super::FrameTransport;
    use crate::motor::frame::Frame;

    /// Classic CAN frames with standard ids on a Linux SocketCAN interface
    pub struct SocketCanTransport {
        socket: CanSocket,
    }

    impl SocketCanTransport {
        pub fn open(ifname: &str) -> io::Result<Self> {
            let socket = CanSocket::open(ifname)?;
            Ok(Self { socket })
        }
    }

    impl FrameTransport for SocketCanTransport {
        fn transmit(&mut self, address: u16, frame: &Frame) -> io::Result<()> {
            let id = StandardId::new(address).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("0x{:X} is not a standard CAN id", address),
                )
            })?;
            let can_frame = CanFrame::new(id, frame.as_bytes()).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "frame does not fit in CAN payload")
            })?;
            self.socket.write_frame(&can_frame)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::frame::{decode, encode_heartbeat, encode_speed};
    use std::thread;

    /// Writes one byte at a time so a missing lock would interleave frames
    struct BytewiseTransport {
        stream: Arc<Mutex<Vec<u8>>>,
    }

    impl FrameTransport for BytewiseTransport {
        fn transmit(&mut self, _address: u16, frame: &Frame) -> io::Result<()> {
            for &byte in frame.as_bytes() {
                self.stream.lock().unwrap().push(byte);
                thread::yield_now();
            }
            Ok(())
        }
    }

    #[test]
    fn test_loopback_records_frames() {
        let loopback = LoopbackTransport::new();
        let bus = Bus::new("can0", loopback.clone());

        bus.send(0x65, &encode_heartbeat(1)).unwrap();
        bus.send(0x66, &encode_speed(2, -42).unwrap()).unwrap();

        let sent = loopback.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].address, 0x65);
        assert_eq!(sent[1].frame.speed_rpm(), Some(-42));
        assert_eq!(loopback.stream().len(), 16);
    }

    #[test]
    fn test_transport_down_reported() {
        let loopback = LoopbackTransport::new();
        let bus = Bus::new("can1", loopback.clone());

        loopback.set_failing(true);
        let err = bus.send(0x67, &encode_heartbeat(3)).unwrap_err();
        assert!(matches!(err, BusError::TransportDown { address: 0x67, .. }));
        assert!(loopback.sent().is_empty());

        // Not retried by the bus, the next send just works again
        loopback.set_failing(false);
        bus.send(0x67, &encode_heartbeat(3)).unwrap();
        assert_eq!(loopback.sent().len(), 1);
    }

    #[test]
    fn test_closed_bus_rejects_send() {
        let bus = Bus::new("can0", LoopbackTransport::new());
        assert!(bus.is_open());
        bus.close();
        assert!(!bus.is_open());
        assert!(matches!(
            bus.send(0x65, &encode_heartbeat(1)),
            Err(BusError::Closed { .. })
        ));
        // Closing twice is harmless
        bus.close();
    }

    #[test]
    fn test_concurrent_sends_do_not_interleave() {
        let stream = Arc::new(Mutex::new(Vec::new()));
        let bus = Arc::new(Bus::new(
            "can0",
            BytewiseTransport {
                stream: stream.clone(),
            },
        ));

        let heartbeat_bus = bus.clone();
        let heartbeats = thread::spawn(move || {
            for _ in 0..200 {
                heartbeat_bus.send(0x65, &encode_heartbeat(1)).unwrap();
            }
        });
        let drive_bus = bus.clone();
        let drives = thread::spawn(move || {
            for rpm in 0..200 {
                drive_bus.send(0x66, &encode_speed(2, rpm).unwrap()).unwrap();
            }
        });
        heartbeats.join().unwrap();
        drives.join().unwrap();

        let stream = stream.lock().unwrap();
        assert_eq!(stream.len(), 400 * 8);
        for chunk in stream.chunks(8) {
            let frame = decode(chunk).unwrap();
            match frame.station_no() {
                1 => assert_eq!(frame.speed_rpm(), None),
                2 => assert!(frame.speed_rpm().is_some()),
                other => panic!("unexpected station {}", other),
            }
        }
    }
}
