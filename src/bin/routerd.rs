//! The router process: wires the NTCP transport acceptor/handshake, and the
//! SAM/BOB/I2CP control-plane bridges, around one shared `ClientContext`.
//! Each bridge's line/frame dispatch stays in its own pure `process`/
//! `handle_line` call (see `sam`/`bob`/`i2cp`); this binary only owns the
//! sockets and the per-connection state those calls need.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use i2p_router_core::bob::{BobBackend, BobServer};
use i2p_router_core::client_context::{ClientContext, RouterConfig};
use i2p_router_core::codec::base64_encode;
use i2p_router_core::i2cp::{I2cpAction, I2cpBackend, I2cpMessage, I2cpServer, I2CP_PROTOCOL_BYTE};
use i2p_router_core::identity::{IdentHash, PrivateKeys};
use i2p_router_core::naming::Address;
use i2p_router_core::netdb::{MockNetDb, MockTunnelPool, NetDb, TunnelPool};
use i2p_router_core::sam::{SamAction, SamBackend, SamServer};
use i2p_router_core::transport::{acceptor, responder, session as transport_session};

/// Loads the router's own long-term identity from `<keys_dir>/router.dat`,
/// generating and persisting a fresh one on first run.
fn load_or_generate_router_keys(keys_dir: &str) -> std::io::Result<PrivateKeys> {
	std::fs::create_dir_all(keys_dir)?;
	let path = std::path::Path::new(keys_dir).join("router.dat");
	if let Ok(bytes) = std::fs::read(&path) {
		if let Ok(keys) = PrivateKeys::from_buffer(&bytes) {
			return Ok(keys);
		}
		warn!("router.dat is present but unreadable, regenerating");
	}
	let keys = PrivateKeys::generate_ed25519();
	std::fs::write(&path, keys.to_buffer())?;
	Ok(keys)
}

/// Shared backend for every control-plane bridge: the one `ClientContext`
/// plus the per-SAM-session transient keys a `SESSION CREATE` minted, since
/// `SamServer` itself stays a pure dispatcher with no crypto side effects.
struct RouterBackend {
	ctx: Arc<Mutex<ClientContext>>,
	sam_session_keys: Mutex<HashMap<String, PrivateKeys>>,
}

impl RouterBackend {
	fn new(ctx: Arc<Mutex<ClientContext>>) -> RouterBackend {
		RouterBackend {
			ctx,
			sam_session_keys: Mutex::new(HashMap::new()),
		}
	}

	/// Resolves `name` to the full base64 destination of one of our own
	/// acquired destinations. Names outside this router's own destination
	/// set would need a netdb lookup, which is out of scope here.
	fn resolve_local_destination(&self, name: &str) -> Option<String> {
		let ctx = self.ctx.lock().unwrap();
		let address = ctx.address_book.get_address(name).ok()?;
		let Address::IdentHash(hash) = address else {
			return None;
		};
		let dest = ctx.find_destination(&hash)?;
		Some(base64_encode(&dest.lease_set_destination.identity().to_buffer()))
	}
}

impl SamBackend for RouterBackend {
	fn generate_destination(&self, _sig_type: Option<&str>, _crypto_type: Option<&str>) -> i2p_router_core::Result<(String, String)> {
		let keys = PrivateKeys::generate_ed25519();
		let public = base64_encode(&keys.identity.to_buffer());
		let private = base64_encode(&keys.to_buffer());
		Ok((public, private))
	}

	fn lookup_name(&self, session_id: &str, name: &str) -> i2p_router_core::Result<String> {
		if name == "ME" {
			let sessions = self.sam_session_keys.lock().unwrap();
			return sessions
				.get(session_id)
				.map(|keys| base64_encode(&keys.identity.to_buffer()))
				.ok_or_else(|| i2p_router_core::Error::NotFound(session_id.to_string()));
		}
		self.resolve_local_destination(name)
			.ok_or_else(|| i2p_router_core::Error::NotFound(name.to_string()))
	}
}

impl BobBackend for RouterBackend {
	fn lookup(&self, host: &str) -> i2p_router_core::Result<String> {
		self.resolve_local_destination(host)
			.ok_or_else(|| i2p_router_core::Error::NotFound(host.to_string()))
	}
}

impl I2cpBackend for RouterBackend {
	fn lookup_host(&self, name: &str) -> i2p_router_core::Result<IdentHash> {
		let ctx = self.ctx.lock().unwrap();
		match ctx.address_book.get_address(name)? {
			Address::IdentHash(hash) => Ok(hash),
			Address::BlindedPublicKey(_) => Err(i2p_router_core::Error::NotFound(name.to_string())),
		}
	}
}

/// If a `SESSION CREATE`/`ADD` line asks for a `TRANSIENT` destination,
/// mints real keys, registers them with `ClientContext`, and rewrites the
/// line so `SamServer::process` sees a concrete (placeholder-free)
/// `DESTINATION=` token — the crypto side effect `SamServer` deliberately
/// never performs itself.
fn materialize_transient_destination(backend: &RouterBackend, line: &str) -> String {
	let trimmed = line.trim_start();
	if !trimmed.to_ascii_uppercase().starts_with("SESSION CREATE") {
		return line.to_string();
	}
	if !line.contains("DESTINATION=TRANSIENT") {
		return line.to_string();
	}
	let keys = PrivateKeys::generate_ed25519();
	let keys_bytes = keys.to_buffer();
	let b64 = base64_encode(&keys_bytes);
	if let Some(id) = extract_param(line, "ID") {
		if let Ok(ctx_keys) = PrivateKeys::from_buffer(&keys_bytes) {
			backend.ctx.lock().unwrap().acquire_destination(ctx_keys);
		}
		backend.sam_session_keys.lock().unwrap().insert(id, keys);
	}
	line.replacen("DESTINATION=TRANSIENT", &format!("DESTINATION={b64}"), 1)
}

fn extract_param(line: &str, key: &str) -> Option<String> {
	line.split_whitespace()
		.find_map(|tok| tok.strip_prefix(&format!("{key}=")))
		.map(|s| s.trim_matches('"').to_string())
}

async fn run_sam_tcp(addr: SocketAddr, backend: Arc<RouterBackend>) -> std::io::Result<()> {
	let listener = TcpListener::bind(addr).await?;
	info!("SAM TCP listening on {addr}");
	loop {
		let (stream, peer) = listener.accept().await?;
		let backend = backend.clone();
		tokio::spawn(async move {
			if let Err(e) = handle_sam_connection(stream, backend).await {
				warn!("SAM connection from {peer} ended: {e}");
			}
		});
	}
}

async fn handle_sam_connection(stream: TcpStream, backend: Arc<RouterBackend>) -> std::io::Result<()> {
	let (reader, mut writer) = stream.into_split();
	let mut lines = BufReader::new(reader).lines();
	let mut sam = SamServer::new();

	while let Some(line) = lines.next_line().await? {
		let line = materialize_transient_destination(&backend, &line);
		let reply = match i2p_router_core::sam::parse_line(&line) {
			Ok(cmd) => sam.process(backend.as_ref(), &cmd),
			Err(e) => Err(e),
		};
		match reply {
			Ok((text, action)) => {
				writer.write_all(text.as_bytes()).await?;
				match action {
					SamAction::None => {}
					SamAction::BecomeStreamPipe { session_id, destination } => {
						info!("SAM session {session_id} becoming a stream pipe to {destination}");
						break;
					}
					SamAction::RegisterAccept { session_id } => {
						info!("SAM session {session_id} registered STREAM ACCEPT");
					}
					SamAction::RegisterForward { session_id, host, port } => {
						info!("SAM session {session_id} forwarding inbound streams to {host}:{port}");
					}
					SamAction::SendDatagram { session_id, destination, reliable, payload_len } => {
						info!("SAM session {session_id} sent {payload_len}-byte {} datagram to {destination}", if reliable { "reliable" } else { "raw" });
					}
				}
			}
			Err(e) => {
				writer.write_all(format!("ERROR {e}\n").as_bytes()).await?;
			}
		}
	}
	Ok(())
}

async fn run_sam_udp(addr: SocketAddr) -> std::io::Result<()> {
	let socket = tokio::net::UdpSocket::bind(addr).await?;
	info!("SAM UDP sidecar listening on {addr}");
	let mut buf = vec![0u8; 65536];
	loop {
		let (n, peer) = socket.recv_from(&mut buf).await?;
		match i2p_router_core::sam::udp::parse_outbound_send(&buf[..n]) {
			Ok(send) => info!(
				"SAM UDP {} from {peer}: session={} dest={} ({} byte payload)",
				send.style,
				send.session_id,
				send.destination_b64,
				send.payload.len()
			),
			Err(e) => warn!("malformed SAM UDP datagram from {peer}: {e}"),
		}
	}
}

async fn run_bob(addr: SocketAddr, backend: Arc<RouterBackend>) -> std::io::Result<()> {
	let listener = TcpListener::bind(addr).await?;
	info!("BOB listening on {addr}");
	let bob = Arc::new(Mutex::new(BobServer::new()));
	loop {
		let (stream, peer) = listener.accept().await?;
		let backend = backend.clone();
		let bob = bob.clone();
		tokio::spawn(async move {
			if let Err(e) = handle_bob_connection(stream, bob, backend).await {
				warn!("BOB connection from {peer} ended: {e}");
			}
		});
	}
}

async fn handle_bob_connection(stream: TcpStream, bob: Arc<Mutex<BobServer>>, backend: Arc<RouterBackend>) -> std::io::Result<()> {
	let (reader, mut writer) = stream.into_split();
	let mut lines = BufReader::new(reader).lines();
	while let Some(line) = lines.next_line().await? {
		let reply = bob.lock().unwrap().handle_line(backend.as_ref(), &line);
		writer.write_all(reply.as_bytes()).await?;
	}
	Ok(())
}

async fn run_i2cp(addr: SocketAddr, backend: Arc<RouterBackend>) -> std::io::Result<()> {
	let listener = TcpListener::bind(addr).await?;
	info!("I2CP listening on {addr}");
	let i2cp = Arc::new(Mutex::new(I2cpServer::new()));
	let next_id = Arc::new(AtomicU16::new(1));
	loop {
		let (stream, peer) = listener.accept().await?;
		let backend = backend.clone();
		let i2cp = i2cp.clone();
		let next_id = next_id.clone();
		tokio::spawn(async move {
			if let Err(e) = handle_i2cp_connection(stream, i2cp, backend, next_id).await {
				warn!("I2CP connection from {peer} ended: {e}");
			}
		});
	}
}

async fn handle_i2cp_connection(
	mut stream: TcpStream,
	i2cp: Arc<Mutex<I2cpServer>>,
	backend: Arc<RouterBackend>,
	next_id: Arc<AtomicU16>,
) -> std::io::Result<()> {
	let mut sentinel = [0u8; 1];
	stream.read_exact(&mut sentinel).await?;
	if sentinel[0] != I2CP_PROTOCOL_BYTE {
		warn!("I2CP connection sent wrong protocol byte {:#x}", sentinel[0]);
		return Ok(());
	}

	let mut buf = Vec::new();
	let mut chunk = [0u8; 4096];
	loop {
		let n = stream.read(&mut chunk).await?;
		if n == 0 {
			return Ok(());
		}
		buf.extend_from_slice(&chunk[..n]);

		loop {
			let parsed = I2cpMessage::parse(&buf);
			let (msg, consumed) = match parsed {
				Ok(pair) => pair,
				Err(_) => break,
			};
			buf.drain(..consumed);

			let session_id = next_id.fetch_add(1, Ordering::SeqCst);
			let outcome = i2cp.lock().unwrap().process(backend.as_ref(), &msg, session_id);
			match outcome {
				Ok((replies, action)) => {
					for reply in replies {
						if let Ok(wire) = reply.to_buffer() {
							stream.write_all(&wire).await?;
						}
					}
					match action {
						I2cpAction::SendMessage { to, payload, nonce } => {
							info!("I2CP SendMessage to {} ({} bytes, nonce {nonce})", to.to_base32(), payload.len());
						}
						I2cpAction::Terminate => return Ok(()),
						I2cpAction::None => {}
					}
				}
				Err(e) => {
					warn!("I2CP message rejected: {e}");
				}
			}
		}
	}
}

/// Active established sessions, keyed by the connection's insertion order.
/// Kept alive here so dropping the handle (which tears down the session's
/// mailbox) only happens on disconnect, not as soon as the spawning task
/// returns.
type SessionTable = Arc<Mutex<HashMap<u64, transport_session::TransportSessionHandle>>>;

async fn run_ntcp(addr: SocketAddr, router_keys: Arc<PrivateKeys>) -> std::io::Result<()> {
	let (tx, mut rx) = mpsc::unbounded_channel();
	tokio::spawn(async move {
		if let Err(e) = acceptor::run_acceptor(addr, 600, tx).await {
			error!("NTCP acceptor stopped: {e}");
		}
	});

	let sessions: SessionTable = Arc::new(Mutex::new(HashMap::new()));
	let mut next_slot = 0u64;

	while let Some(conn) = rx.recv().await {
		let router_keys = router_keys.clone();
		let sessions = sessions.clone();
		let slot = next_slot;
		next_slot += 1;
		tokio::spawn(async move {
			match responder::run_responder_handshake(conn.stream, &router_keys).await {
				Ok((handshake, stream)) => {
					info!("NTCP handshake established with {}", handshake.remote_identity.hash().to_base32());
					let cleanup_sessions = sessions.clone();
					let handle = transport_session::spawn_session(
						stream,
						handshake.encrypt,
						handshake.decrypt,
						handshake.remote_identity,
						|payload| {
							info!("received {} byte I2NP message", payload.len());
						},
						move |hash| {
							info!("transport session to {} closed", IdentHash::new(hash.0).to_base32());
							cleanup_sessions.lock().unwrap().remove(&slot);
						},
					);
					sessions.lock().unwrap().insert(slot, handle);
				}
				Err(e) => {
					warn!("NTCP handshake with {} failed: {e}", conn.peer_addr);
				}
			}
		});
	}
	Ok(())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
	env_logger::init();

	let config_path = std::env::args().nth(1).unwrap_or_else(|| "router.toml".to_string());
	let config = RouterConfig::load(&config_path).unwrap_or_else(|e| {
		warn!("failed to load {config_path}, using defaults: {e}");
		RouterConfig::default()
	});

	let router_keys = Arc::new(load_or_generate_router_keys(&config.keys_dir)?);
	info!("router identity: {}", router_keys.identity.hash().to_base32());

	let netdb: Arc<dyn NetDb> = Arc::new(MockNetDb::new(vec![]));
	let tunnels: Arc<dyn TunnelPool> = Arc::new(MockTunnelPool { tunnels: vec![] });
	let ctx = Arc::new(Mutex::new(ClientContext::new(config.clone(), netdb, tunnels)));
	let backend = Arc::new(RouterBackend::new(ctx));

	let ntcp_addr: SocketAddr = ([0, 0, 0, 0], config.ntcp_port).into();
	let sam_tcp_addr: SocketAddr = ([127, 0, 0, 1], config.sam_tcp_port).into();
	let sam_udp_addr: SocketAddr = ([127, 0, 0, 1], config.sam_udp_port).into();
	let bob_addr: SocketAddr = ([127, 0, 0, 1], config.bob_port).into();
	let i2cp_addr: SocketAddr = ([127, 0, 0, 1], config.i2cp_port).into();

	tokio::spawn(run_ntcp(ntcp_addr, router_keys));
	tokio::spawn(run_sam_tcp(sam_tcp_addr, backend.clone()));
	tokio::spawn(run_sam_udp(sam_udp_addr));
	tokio::spawn(run_bob(bob_addr, backend.clone()));
	tokio::spawn(run_i2cp(i2cp_addr, backend));

	tokio::signal::ctrl_c().await?;
	info!("shutting down");
	Ok(())
}
