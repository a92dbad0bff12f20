//! Per-client peer connections and data channels, plus the ~30 Hz fan-out
//! loop that drains each track's queue into every client subscribed to it.
//! Implements [`vidanalyze_core::Transport`] / [`vidanalyze_core::TransportHandle`].

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use vidanalyze_core::{Error, Result, Transport, TransportConfig, TransportHandle, TransportStats};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::framing::frame_payload;
use crate::signaling::run_signaling_server;

/// Default signaling port, used when the server config doesn't override it.
pub const DEFAULT_SIGNALING_PORT: u16 = 8083;
/// Logged-only streamer port named by the external-interfaces defaults.
pub const DEFAULT_STREAMER_PORT: u16 = 8080;
/// Default ICE candidate UDP port range.
pub const DEFAULT_ICE_PORT_RANGE: (u16, u16) = (10000, 10100);
/// Default bind address for signaling and ICE.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
/// Source id assumed for a client that never sends `switch_source`.
pub const DEFAULT_SOURCE_ID: &str = "camera_01";

const FANOUT_HZ: u64 = 30;
const QUEUE_CAPACITY: usize = 10;

struct TrackQueue {
    frames: VecDeque<(Vec<u8>, i64)>,
    bytes_sent: AtomicU64,
    packets_sent: AtomicU64,
    packets_dropped: AtomicU64,
}

impl TrackQueue {
    fn new() -> Self {
        Self {
            frames: VecDeque::with_capacity(QUEUE_CAPACITY),
            bytes_sent: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
        }
    }

    /// Pushes a new packet, dropping the oldest queued one if already at
    /// capacity. Returns whether a drop occurred.
    fn push(&mut self, payload: Vec<u8>, pts_us: i64) -> bool {
        let dropped = if self.frames.len() >= QUEUE_CAPACITY {
            self.frames.pop_front();
            true
        } else {
            false
        };
        self.frames.push_back((payload, pts_us));
        dropped
    }
}

struct ClientState {
    requested_source: Mutex<String>,
    peer_connection: Mutex<Option<Arc<RTCPeerConnection>>>,
    data_channel: Mutex<Option<Arc<RTCDataChannel>>>,
    connected: AtomicBool,
    ws_tx: UnboundedSender<String>,
    /// Prevents a client that repeats `request_offer` mid-negotiation from
    /// starting a second, racing PeerConnection.
    in_flight_offer: AtomicBool,
}

/// Owns every connected WebRTC client and every track's outbound frame
/// queue. `Streamer::ensure_started` is idempotent so multiple tracks can
/// share the one signaling endpoint and fan-out loop.
pub struct Streamer {
    api: API,
    clients: Mutex<HashMap<String, Arc<ClientState>>>,
    tracks: Mutex<HashMap<String, Arc<Mutex<TrackQueue>>>>,
    started: std::sync::Once,
}

impl Streamer {
    fn new(bind_addr: IpAddr, ice_port_range: (u16, u16)) -> Result<Arc<Self>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::Other(format!("failed to register codecs: {e}")))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| Error::Other(format!("failed to register interceptors: {e}")))?;

        let mut settings = SettingEngine::default();
        settings.set_ephemeral_udp_port_range(ice_port_range.0, ice_port_range.1);
        settings.set_ip_filter(Box::new(move |ip| ip == bind_addr));

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(settings)
            .build();

        Ok(Arc::new(Self {
            api,
            clients: Mutex::new(HashMap::new()),
            tracks: Mutex::new(HashMap::new()),
            started: std::sync::Once::new(),
        }))
    }

    fn track_queue(&self, track_key: &str) -> Arc<Mutex<TrackQueue>> {
        Arc::clone(
            self.tracks
                .lock()
                .entry(track_key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(TrackQueue::new()))),
        )
    }

    /// Whether any client with an open data channel currently has
    /// `track_key` as its requested source.
    fn has_connected_client(&self, track_key: &str) -> bool {
        self.clients.lock().values().any(|client| {
            client.connected.load(Ordering::SeqCst) && *client.requested_source.lock() == track_key
        })
    }

    /// Starts the signaling server and fan-out loop exactly once, no matter
    /// how many tracks call `connect`.
    fn ensure_started(self: &Arc<Self>, signaling_addr: SocketAddr) {
        self.started.call_once(|| {
            tokio::spawn(run_signaling_server(signaling_addr, Arc::clone(self)));
            tokio::spawn(fanout_loop(Arc::clone(self)));
        });
    }

    pub(crate) fn register_client(&self, client_type: String, ws_tx: UnboundedSender<String>) -> String {
        let id = format!("client_{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        let client = Arc::new(ClientState {
            requested_source: Mutex::new(DEFAULT_SOURCE_ID.to_string()),
            peer_connection: Mutex::new(None),
            data_channel: Mutex::new(None),
            connected: AtomicBool::new(false),
            ws_tx,
            in_flight_offer: AtomicBool::new(false),
        });
        self.clients.lock().insert(id.clone(), client);
        info!(client_id = %id, client_type = %client_type, "client authenticated");
        id
    }

    pub(crate) fn remove_client(&self, client_id: &str) {
        if let Some(client) = self.clients.lock().remove(client_id) {
            if let Some(pc) = client.peer_connection.lock().take() {
                tokio::spawn(async move {
                    let _ = pc.close().await;
                });
            }
        }
        info!(client_id = %client_id, "client disconnected");
    }

    pub(crate) async fn handle_client_message(
        self: &Arc<Self>,
        client_id: &str,
        kind: &str,
        data: Option<serde_json::Value>,
    ) {
        let Some(client) = self.clients.lock().get(client_id).cloned() else {
            return;
        };

        match kind {
            "request_offer" => {
                if let Some(source_id) = source_id_of(&data) {
                    *client.requested_source.lock() = source_id;
                }
                self.create_offer(client_id.to_string(), client).await;
            }
            "answer" => {
                let Some(sdp) = data.as_ref().and_then(|d| d.get("sdp")).and_then(|v| v.as_str()) else {
                    return;
                };
                handle_answer(&client, sdp.to_string()).await;
            }
            "ice_candidate" => {
                let Some(data) = data else { return };
                let Some(candidate) = data.get("candidate").and_then(|v| v.as_str()) else {
                    return;
                };
                let sdp_mid = data.get("sdpMid").and_then(|v| v.as_str()).map(str::to_string);
                handle_ice_candidate(&client, candidate.to_string(), sdp_mid).await;
            }
            "switch_source" => {
                if let Some(source_id) = source_id_of(&data) {
                    debug!(client_id = %client_id, source_id = %source_id, "client switched requested source");
                    *client.requested_source.lock() = source_id;
                }
            }
            other => debug!(client_id = %client_id, kind = %other, "ignoring unknown signaling message"),
        }
    }

    async fn create_offer(self: &Arc<Self>, client_id: String, client: Arc<ClientState>) {
        if client.in_flight_offer.swap(true, Ordering::SeqCst) {
            debug!(client_id = %client_id, "ignoring duplicate request_offer while negotiation in flight");
            return;
        }

        let config = RTCConfiguration {
            ice_servers: vec![],
            ..Default::default()
        };

        let peer_connection = match self.api.new_peer_connection(config).await {
            Ok(pc) => Arc::new(pc),
            Err(err) => {
                warn!(client_id = %client_id, error = %err, "failed to create peer connection");
                client.in_flight_offer.store(false, Ordering::SeqCst);
                return;
            }
        };

        let data_channel = match peer_connection
            .create_data_channel("video", Some(RTCDataChannelInit::default()))
            .await
        {
            Ok(dc) => dc,
            Err(err) => {
                warn!(client_id = %client_id, error = %err, "failed to create data channel");
                client.in_flight_offer.store(false, Ordering::SeqCst);
                return;
            }
        };

        {
            let client_for_open = Arc::clone(&client);
            let dc_for_open = Arc::clone(&data_channel);
            data_channel.on_open(Box::new(move || {
                client_for_open.connected.store(true, Ordering::SeqCst);
                *client_for_open.data_channel.lock() = Some(Arc::clone(&dc_for_open));
                Box::pin(async {})
            }));
        }
        {
            let client_for_close = Arc::clone(&client);
            data_channel.on_close(Box::new(move || {
                client_for_close.connected.store(false, Ordering::SeqCst);
                *client_for_close.data_channel.lock() = None;
                Box::pin(async {})
            }));
        }
        {
            let ws_tx = client.ws_tx.clone();
            let client_id_for_ice = client_id.clone();
            peer_connection.on_ice_candidate(Box::new(move |candidate| {
                let ws_tx = ws_tx.clone();
                let client_id = client_id_for_ice.clone();
                Box::pin(async move {
                    let Some(candidate) = candidate else { return };
                    let Ok(init) = candidate.to_json() else { return };
                    let message = serde_json::json!({
                        "type": "ice_candidate",
                        "client_id": client_id,
                        "data": {"candidate": init.candidate, "sdpMid": init.sdp_mid},
                    });
                    let _ = ws_tx.send(message.to_string());
                })
            }));
        }
        {
            let client_for_state = Arc::clone(&client);
            peer_connection.on_peer_connection_state_change(Box::new(move |state| {
                if matches!(
                    state,
                    RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Closed
                        | RTCPeerConnectionState::Disconnected
                ) {
                    client_for_state.connected.store(false, Ordering::SeqCst);
                }
                Box::pin(async {})
            }));
        }

        let offer = match peer_connection.create_offer(None).await {
            Ok(offer) => offer,
            Err(err) => {
                warn!(client_id = %client_id, error = %err, "failed to create offer");
                client.in_flight_offer.store(false, Ordering::SeqCst);
                return;
            }
        };
        if let Err(err) = peer_connection.set_local_description(offer.clone()).await {
            warn!(client_id = %client_id, error = %err, "failed to set local description");
            client.in_flight_offer.store(false, Ordering::SeqCst);
            return;
        }

        *client.peer_connection.lock() = Some(peer_connection);
        client.in_flight_offer.store(false, Ordering::SeqCst);

        let message = serde_json::json!({
            "type": "offer",
            "data": {"type": "offer", "sdp": offer.sdp},
        });
        let _ = client.ws_tx.send(message.to_string());
    }
}

fn source_id_of(data: &Option<serde_json::Value>) -> Option<String> {
    data.as_ref()
        .and_then(|d| d.get("source_id"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

async fn handle_answer(client: &Arc<ClientState>, sdp: String) {
    let peer_connection = client.peer_connection.lock().clone();
    let Some(peer_connection) = peer_connection else { return };
    match RTCSessionDescription::answer(sdp) {
        Ok(desc) => {
            if let Err(err) = peer_connection.set_remote_description(desc).await {
                warn!(error = %err, "failed to set remote description");
            }
        }
        Err(err) => warn!(error = %err, "invalid answer sdp"),
    }
}

async fn handle_ice_candidate(client: &Arc<ClientState>, candidate: String, sdp_mid: Option<String>) {
    let peer_connection = client.peer_connection.lock().clone();
    let Some(peer_connection) = peer_connection else { return };
    let init = RTCIceCandidateInit {
        candidate,
        sdp_mid,
        ..Default::default()
    };
    if let Err(err) = peer_connection.add_ice_candidate(init).await {
        warn!(error = %err, "failed to add ice candidate");
    }
}

/// Pops one frame per connected, data-channel-open client at ~30 Hz and
/// ships it framed per the length-prefix/chunking discipline.
async fn fanout_loop(streamer: Arc<Streamer>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(1000 / FANOUT_HZ));
    loop {
        ticker.tick().await;

        let clients: Vec<Arc<ClientState>> = streamer.clients.lock().values().cloned().collect();
        for client in clients {
            if !client.connected.load(Ordering::SeqCst) {
                continue;
            }
            let data_channel = client.data_channel.lock().clone();
            let Some(data_channel) = data_channel else { continue };

            let source_id = client.requested_source.lock().clone();
            let queue = streamer.tracks.lock().get(&source_id).cloned();
            let Some(queue) = queue else { continue };

            let next = queue.lock().frames.pop_front();
            let Some((payload, _pts_us)) = next else { continue };

            let messages = frame_payload(&payload);
            let chunked = messages.len() > 1;
            for (i, message) in messages.iter().enumerate() {
                if let Err(err) = data_channel.send(&bytes::Bytes::from(message.clone())).await {
                    debug!(error = %err, "data channel send failed, dropping frame for client");
                    break;
                }
                if chunked && i + 1 < messages.len() {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        }
    }
}

struct StreamerHandle {
    streamer: Arc<Streamer>,
    track_key: String,
    queue: Arc<Mutex<TrackQueue>>,
}

impl TransportHandle for StreamerHandle {
    fn send(&self, packet: &[u8], pts_us: i64) -> Result<()> {
        let mut queue = self.queue.lock();
        if queue.push(packet.to_vec(), pts_us) {
            queue.packets_dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.packets_sent.fetch_add(1, Ordering::Relaxed);
        queue.bytes_sent.fetch_add(packet.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        let queue = self.queue.lock();
        TransportStats {
            connected: self.streamer.has_connected_client(&self.track_key),
            bytes_sent: queue.bytes_sent.load(Ordering::Relaxed),
            packets_sent: queue.packets_sent.load(Ordering::Relaxed),
            packets_dropped: queue.packets_dropped.load(Ordering::Relaxed),
        }
    }

    fn disconnect(&self) {
        self.queue.lock().frames.clear();
    }
}

/// The [`vidanalyze_core::Transport`] implementation: one signaling server
/// and fan-out loop shared by every track that connects through it.
pub struct WebRtcTransport {
    streamer: Arc<Streamer>,
    signaling_addr: SocketAddr,
}

impl WebRtcTransport {
    pub fn new(bind_addr: &str, signaling_port: u16, ice_port_range: (u16, u16)) -> Result<Self> {
        let ip = IpAddr::from_str(bind_addr)
            .map_err(|e| Error::InvalidConfig(format!("invalid bind address '{bind_addr}': {e}")))?;
        let streamer = Streamer::new(ip, ice_port_range)?;
        Ok(Self {
            streamer,
            signaling_addr: SocketAddr::new(ip, signaling_port),
        })
    }
}

impl Transport for WebRtcTransport {
    fn connect(&self, track_key: &str, _config: &TransportConfig) -> Result<Box<dyn TransportHandle>> {
        self.streamer.ensure_started(self.signaling_addr);
        Ok(Box::new(StreamerHandle {
            streamer: Arc::clone(&self.streamer),
            track_key: track_key.to_string(),
            queue: self.streamer.track_queue(track_key),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_accepts_up_to_capacity_without_dropping() {
        let mut queue = TrackQueue::new();
        for i in 0..QUEUE_CAPACITY {
            assert!(!queue.push(vec![i as u8], i as i64));
        }
        assert_eq!(queue.frames.len(), QUEUE_CAPACITY);
    }

    #[test]
    fn an_eleventh_frame_drops_exactly_the_oldest() {
        let mut queue = TrackQueue::new();
        for i in 0..QUEUE_CAPACITY {
            queue.push(vec![i as u8], i as i64);
        }
        let dropped = queue.push(vec![99], 99);
        assert!(dropped, "pushing past capacity reports a drop");
        assert_eq!(queue.frames.len(), QUEUE_CAPACITY);
        // oldest entry (payload [0]) is gone, newest ([1]..[9], [99]) remain.
        let payloads: Vec<u8> = queue.frames.iter().map(|(p, _)| p[0]).collect();
        assert_eq!(payloads, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 99]);
    }

    #[test]
    fn source_id_of_reads_the_data_field() {
        let data = serde_json::json!({"source_id": "camera_02"});
        assert_eq!(source_id_of(&Some(data)), Some("camera_02".to_string()));
        assert_eq!(source_id_of(&None), None);
    }

    #[test]
    fn handle_sends_update_stats_and_count_drops_once() {
        let streamer = Streamer::new(IpAddr::from_str("127.0.0.1").unwrap(), DEFAULT_ICE_PORT_RANGE).unwrap();
        let queue = streamer.track_queue("cam:default");
        let handle = StreamerHandle {
            streamer: Arc::clone(&streamer),
            track_key: "cam:default".to_string(),
            queue: Arc::clone(&queue),
        };
        for i in 0..QUEUE_CAPACITY + 3 {
            handle.send(&[i as u8], i as i64).unwrap();
        }
        let stats = handle.stats();
        assert_eq!(stats.packets_sent, (QUEUE_CAPACITY + 3) as u64);
        assert_eq!(stats.packets_dropped, 3);
        assert_eq!(stats.bytes_sent, (QUEUE_CAPACITY + 3) as u64);
        assert!(!stats.connected, "no client has subscribed to this track");

        handle.disconnect();
        assert!(queue.lock().frames.is_empty());
    }
}
