use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use mavio::protocol::{ComponentId, Message, SystemId, Versionless, V2};
use mavio::{Frame, Sender};
use parking_lot::Mutex;

use crate::consts::{MAX_PACKET_LEN, READ_IDLE_INTERVAL};
use crate::core::io::Transport;
use crate::core::utils::SharedCloser;
use crate::link::codec::{DecoderEvent, FrameDecoder};
use crate::link::stats::{LinkStats, LinkStatsSnapshot};
use crate::prelude::*;

/// Sink for validated inbound frames.
///
/// Invoked on the receive thread; implementations must not block.
pub type FrameCallback = Arc<dyn Fn(Frame<Versionless>) + Send + Sync>;

/// MAVLink protocol engine.
///
/// Owns a transport for its whole lifetime, drives the framing state machine
/// on a dedicated receive thread, and stamps outgoing frames with a strictly
/// increasing sequence (mod 256) under a transmit lock.
///
/// The engine is single-shot: once stopped it cannot be started again.
pub struct LinkEngine {
    transport: Arc<Mutex<Box<dyn Transport>>>,
    system_id: SystemId,
    component_id: ComponentId,
    sequence: AtomicU8,
    stats: Arc<LinkStats>,
    callback: Arc<Mutex<Option<FrameCallback>>>,
    state: Mutex<EngineState>,
}

enum EngineState {
    Idle,
    Running {
        closer: SharedCloser,
        receiver: JoinHandle<()>,
    },
    Stopped,
}

impl LinkEngine {
    /// Creates an engine over `transport`.
    ///
    /// Frames sent through this engine carry `system_id` / `component_id`
    /// as their source identifiers. No I/O happens until
    /// [`start`](LinkEngine::start).
    pub fn new(
        transport: Box<dyn Transport>,
        system_id: SystemId,
        component_id: ComponentId,
    ) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            system_id,
            component_id,
            sequence: AtomicU8::new(0),
            stats: Arc::new(LinkStats::default()),
            callback: Arc::new(Mutex::new(None)),
            state: Mutex::new(EngineState::Idle),
        }
    }

    /// Opens the transport and spawns the receive thread.
    ///
    /// Fails if the engine is already running, was stopped earlier, or the
    /// transport cannot be opened.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        match &*state {
            EngineState::Idle => {}
            EngineState::Running { .. } => {
                return Err(Error::Link("engine is already running".to_string()))
            }
            EngineState::Stopped => {
                return Err(Error::Link("engine cannot be restarted".to_string()))
            }
        }

        self.transport.lock().open()?;

        let closer = SharedCloser::new();
        let worker = ReceiveWorker {
            state: closer.clone(),
            transport: self.transport.clone(),
            stats: self.stats.clone(),
            callback: self.callback.clone(),
        };
        let receiver = thread::Builder::new()
            .name("mavlink-rx".to_string())
            .spawn(move || worker.run())?;

        *state = EngineState::Running { closer, receiver };
        log::info!("link: engine started");
        Ok(())
    }

    /// Signals the receive thread to exit, joins it, and closes the
    /// transport. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if let EngineState::Running { closer, receiver } =
            std::mem::replace(&mut *state, EngineState::Stopped)
        {
            closer.close();
            if receiver.join().is_err() {
                log::error!("link: receive thread panicked");
            }
            self.transport.lock().close();
            log::info!("link: engine stopped");
        }
    }

    /// Returns `true` while the receive thread is alive.
    ///
    /// Becomes `false` after [`stop`](LinkEngine::stop) or after a fatal
    /// transport read error.
    pub fn is_running(&self) -> bool {
        match &*self.state.lock() {
            EngineState::Running { closer, .. } => !closer.is_closed(),
            _ => false,
        }
    }

    /// Frames `message` and pushes it through the transport.
    ///
    /// The frame is stamped with the next value of the sequence counter;
    /// callers never control sequence numbers. Safe to call from multiple
    /// threads: the transmit lock keeps stamp order equal to emission order.
    pub fn send(&self, message: &impl Message) -> Result<()> {
        let mut transport = self.transport.lock();
        if !transport.is_open() {
            return Err(Error::Link("transport is not open".to_string()));
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::builder()
            .sequence(sequence)
            .system_id(self.system_id)
            .component_id(self.component_id)
            .version(V2)
            .message(message)?
            .build();

        let mut buf = Vec::with_capacity(MAX_PACKET_LEN);
        Sender::new(&mut buf).send(&frame)?;

        let written = transport.write(&buf)?;
        if written != buf.len() {
            return Err(Error::Link(format!(
                "short transport write: {written} of {} bytes",
                buf.len()
            )));
        }

        self.stats.inc_messages_sent();
        Ok(())
    }

    /// Installs or replaces the sink for validated inbound frames.
    ///
    /// The callback runs on the receive thread and must return quickly.
    pub fn set_frame_callback<F>(&self, callback: F)
    where
        F: Fn(Frame<Versionless>) + Send + Sync + 'static,
    {
        *self.callback.lock() = Some(Arc::new(callback));
    }

    /// MAVLink system id stamped on outgoing frames.
    pub fn system_id(&self) -> SystemId {
        self.system_id
    }

    /// MAVLink component id stamped on outgoing frames.
    pub fn component_id(&self) -> ComponentId {
        self.component_id
    }

    /// Point-in-time copy of the connection counters.
    pub fn stats(&self) -> LinkStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for LinkEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Receive loop state. Runs on the dedicated `mavlink-rx` thread.
struct ReceiveWorker {
    state: SharedCloser,
    transport: Arc<Mutex<Box<dyn Transport>>>,
    stats: Arc<LinkStats>,
    callback: Arc<Mutex<Option<FrameCallback>>>,
}

impl ReceiveWorker {
    fn run(self) {
        let mut decoder = FrameDecoder::new();
        let mut read_buf = [0u8; MAX_PACKET_LEN];
        let mut last_sequence: Option<u8> = None;

        while !self.state.is_closed() {
            let bytes_read = match self.transport.lock().read(&mut read_buf) {
                Ok(0) => {
                    thread::sleep(READ_IDLE_INTERVAL);
                    continue;
                }
                Ok(bytes_read) => bytes_read,
                Err(err) => {
                    log::error!("link: transport read failed, closing connection: {err}");
                    self.state.close();
                    break;
                }
            };

            decoder.push(&read_buf[..bytes_read]);
            while let Some(event) = decoder.next_event() {
                match event {
                    DecoderEvent::Frame(frame) => self.handle_frame(frame, &mut last_sequence),
                    DecoderEvent::BadCrc => {
                        self.stats.inc_crc_errors();
                        log::trace!("link: dropped frame with invalid checksum");
                    }
                    DecoderEvent::Malformed => {
                        self.stats.inc_parse_errors();
                    }
                }
            }
        }
    }

    fn handle_frame(&self, frame: Frame<Versionless>, last_sequence: &mut Option<u8>) {
        self.stats.inc_messages_received();

        if let Some(last) = *last_sequence {
            if frame.sequence() != last.wrapping_add(1) {
                self.stats.inc_sequence_gaps();
            }
        }
        *last_sequence = Some(frame.sequence());

        // Snapshot under the lock, invoke outside it, so the callback can be
        // swapped while the loop runs.
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
    use std::time::Duration;

    use mavio::dialects::common::enums::{MavAutopilot, MavState};
    use mavio::dialects::common::messages::Heartbeat;
    use portpicker::pick_unused_port;

    use crate::core::io::UdpTransport;

    #[derive(Debug, Default)]
    struct TestBuffers {
        incoming: VecDeque<Vec<u8>>,
        outgoing: Vec<u8>,
        open: bool,
        fail_reads: bool,
    }

    /// Scripted transport: reads pop queued chunks, writes are captured.
    #[derive(Clone, Debug, Default)]
    struct TestTransport(Arc<Mutex<TestBuffers>>);

    impl Transport for TestTransport {
        fn open(&mut self) -> Result<()> {
            self.0.lock().open = true;
            Ok(())
        }

        fn close(&mut self) {
            self.0.lock().open = false;
        }

        fn is_open(&self) -> bool {
            self.0.lock().open
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let mut buffers = self.0.lock();
            if buffers.fail_reads {
                return Err(Error::Transport("scripted read failure".to_string()));
            }
            match buffers.incoming.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }

        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            self.0.lock().outgoing.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    fn heartbeat() -> Heartbeat {
        Heartbeat {
            type_: Default::default(),
            autopilot: MavAutopilot::Generic,
            base_mode: Default::default(),
            custom_mode: 0,
            system_status: MavState::Active,
            mavlink_version: 3,
        }
    }

    fn heartbeat_frame_bytes(sequence: u8) -> Vec<u8> {
        let frame = Frame::builder()
            .sequence(sequence)
            .system_id(1)
            .component_id(1)
            .version(V2)
            .message(&heartbeat())
            .unwrap()
            .build();
        let mut buf = Vec::new();
        Sender::new(&mut buf).send(&frame).unwrap();
        buf
    }

    fn wait_for(predicate: impl Fn() -> bool) -> bool {
        for _ in 0..1_000 {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn engine_over(transport: TestTransport) -> (LinkEngine, Arc<Mutex<Vec<Frame<Versionless>>>>) {
        let engine = LinkEngine::new(Box::new(transport), 1, 1);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        engine.set_frame_callback(move |frame| sink.lock().push(frame));
        (engine, received)
    }

    #[test]
    fn delivers_validated_frames_to_the_callback() {
        let transport = TestTransport::default();
        transport.0.lock().incoming.push_back(heartbeat_frame_bytes(0));

        let (engine, received) = engine_over(transport);
        engine.start().unwrap();

        assert!(wait_for(|| engine.stats().messages_received == 1));
        engine.stop();

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].sequence(), 0);
        assert_eq!(engine.stats().sequence_gaps, 0);
    }

    #[test]
    fn counts_a_gap_between_non_consecutive_sequences() {
        let transport = TestTransport::default();
        {
            let mut buffers = transport.0.lock();
            buffers.incoming.push_back(heartbeat_frame_bytes(0));
            buffers.incoming.push_back(heartbeat_frame_bytes(5));
        }

        let (engine, _received) = engine_over(transport);
        engine.start().unwrap();

        assert!(wait_for(|| engine.stats().messages_received == 2));
        engine.stop();

        assert_eq!(engine.stats().sequence_gaps, 1);
    }

    #[test]
    fn corrupted_frame_is_counted_and_loop_stays_alive() {
        let mut corrupted = heartbeat_frame_bytes(0);
        corrupted[10] ^= 0xFF;

        let transport = TestTransport::default();
        {
            let mut buffers = transport.0.lock();
            buffers.incoming.push_back(corrupted);
            buffers.incoming.push_back(heartbeat_frame_bytes(1));
        }

        let (engine, received) = engine_over(transport);
        engine.start().unwrap();

        assert!(wait_for(|| engine.stats().messages_received == 1));
        engine.stop();

        assert_eq!(engine.stats().crc_errors, 1);
        assert_eq!(received.lock().len(), 1);
    }

    #[test]
    fn read_error_is_terminal() {
        let transport = TestTransport::default();
        transport.0.lock().fail_reads = true;

        let (engine, _received) = engine_over(transport);
        engine.start().unwrap();

        assert!(wait_for(|| !engine.is_running()));
        engine.stop();
    }

    #[test]
    fn start_is_not_idempotent_and_engine_is_single_shot() {
        let (engine, _received) = engine_over(TestTransport::default());

        engine.start().unwrap();
        assert!(engine.start().is_err());

        engine.stop();
        engine.stop();
        assert!(engine.start().is_err());
    }

    #[test]
    fn send_before_start_fails() {
        let (engine, _received) = engine_over(TestTransport::default());
        assert!(engine.send(&heartbeat()).is_err());
    }

    #[test]
    fn concurrent_sends_emit_strictly_increasing_sequences() {
        const SENDERS: usize = 3;
        const PER_SENDER: usize = 1_000;

        let transport = TestTransport::default();
        let buffers = transport.0.clone();

        let engine = Arc::new(LinkEngine::new(Box::new(transport), 1, 1));
        engine.start().unwrap();

        let mut workers = Vec::new();
        for _ in 0..SENDERS {
            let engine = engine.clone();
            workers.push(thread::spawn(move || {
                for _ in 0..PER_SENDER {
                    engine.send(&heartbeat()).unwrap();
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        engine.stop();

        assert_eq!(engine.stats().messages_sent, (SENDERS * PER_SENDER) as u64);

        // Replay the captured transmit buffer: emission order must carry
        // sequences 0, 1, 2, ... mod 256 without duplicates or gaps.
        let mut decoder = FrameDecoder::new();
        decoder.push(&buffers.lock().outgoing);

        let mut expected: u8 = 0;
        let mut total = 0;
        while let Some(event) = decoder.next_event() {
            match event {
                DecoderEvent::Frame(frame) => {
                    assert_eq!(frame.sequence(), expected);
                    expected = expected.wrapping_add(1);
                    total += 1;
                }
                other => panic!("unexpected decoder event: {other:?}"),
            }
        }
        assert_eq!(total, SENDERS * PER_SENDER);
    }

    #[test]
    fn receives_over_a_real_udp_socket() {
        let port = pick_unused_port().unwrap();
        let transport =
            UdpTransport::new(port).with_bind_addr(Ipv4Addr::LOCALHOST.into());

        let engine = LinkEngine::new(Box::new(transport), 1, 1);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        engine.set_frame_callback(move |frame| sink.lock().push(frame));
        engine.start().unwrap();

        let peer = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        peer.send_to(&heartbeat_frame_bytes(0), target).unwrap();

        assert!(wait_for(|| engine.stats().messages_received == 1));
        engine.stop();

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].sequence(), 0);
        assert_eq!(received[0].system_id(), 1);
    }
}
