// Copyright (C) 2024-2025 The spectre-crawler authors.
// This file is part of the spectre-crawler library.

// The spectre-crawler library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The spectre-crawler library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with the spectre-crawler library. If not, see <https://www.gnu.org/licenses/>.

#![allow(dead_code)]

use spectre_crawler_node::{Address, Limits, DEFAULT_PORT};
use spectre_crawler_protowire::{
    p2p_server::{P2p, P2pServer},
    NetAddress,
    Payload,
    SpectredMessage,
    VersionMessage,
};

use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::{transport::Server, Request, Response, Status, Streaming};

/// Behavior knobs for an in-process peer.
#[derive(Clone)]
pub struct TestPeerConfig {
    pub protocol_version: u32,
    pub user_agent: String,
    /// The address list returned for every request.
    pub neighbors: Vec<NetAddress>,
    /// Never answer address requests when set.
    pub mute: bool,
    /// Counts accepted sessions.
    pub sessions: Arc<AtomicUsize>,
    /// Counts served address rounds.
    pub address_rounds: Arc<AtomicUsize>,
}

impl Default for TestPeerConfig {
    fn default() -> Self {
        Self {
            protocol_version: 5,
            user_agent: "/spectred:0.3.16/".into(),
            neighbors: Vec::new(),
            mute: false,
            sessions: Default::default(),
            address_rounds: Default::default(),
        }
    }
}

#[derive(Clone)]
struct TestPeer {
    config: TestPeerConfig,
}

#[tonic::async_trait]
impl P2p for TestPeer {
    type MessageStreamStream = ReceiverStream<Result<SpectredMessage, Status>>;

    async fn message_stream(
        &self,
        request: Request<Streaming<SpectredMessage>>,
    ) -> Result<Response<Self::MessageStreamStream>, Status> {
        let config = self.config.clone();
        config.sessions.fetch_add(1, Ordering::SeqCst);
        let inbound = request.into_inner();
        let (sender, receiver) = mpsc::channel(64);
        tokio::spawn(run_peer(config, inbound, sender));
        Ok(Response::new(ReceiverStream::new(receiver)))
    }
}

/// Mirrors a spectred node's side of the exchange: announce `version`, ack
/// the crawler's, complete the `ready` phase where the protocol has one, then
/// serve address requests until the crawler goes away.
async fn run_peer(
    config: TestPeerConfig,
    mut inbound: Streaming<SpectredMessage>,
    sender: mpsc::Sender<Result<SpectredMessage, Status>>,
) -> Option<()> {
    let send = |message: SpectredMessage| {
        let sender = sender.clone();
        async move { sender.send(Ok(message)).await.ok() }
    };

    send(SpectredMessage::version(VersionMessage {
        protocol_version: config.protocol_version,
        timestamp: 0,
        id: vec![0xab; 16],
        user_agent: config.user_agent.clone(),
        network: "spectre-mainnet".into(),
    }))
    .await?;
    wait_for(&mut inbound, |payload| matches!(payload, Payload::Version(..))).await?;

    send(SpectredMessage::verack()).await?;
    wait_for(&mut inbound, |payload| matches!(payload, Payload::Verack(..))).await?;

    if config.protocol_version >= 4 {
        send(SpectredMessage::ready()).await?;
        wait_for(&mut inbound, |payload| matches!(payload, Payload::Ready(..))).await?;
    }

    loop {
        wait_for(&mut inbound, |payload| matches!(payload, Payload::RequestAddresses(..))).await?;
        if config.mute {
            continue;
        }
        config.address_rounds.fetch_add(1, Ordering::SeqCst);
        send(SpectredMessage::addresses(config.neighbors.clone())).await?;
    }
}

async fn wait_for(
    inbound: &mut Streaming<SpectredMessage>,
    predicate: impl Fn(&Payload) -> bool,
) -> Option<()> {
    loop {
        let frame = inbound.message().await.ok()??;
        if let Some(payload) = &frame.payload {
            if predicate(payload) {
                return Some(());
            }
        }
    }
}

/// Binds a local listener for a peer, returning it with its address. Binding
/// upfront lets tests wire peers to each other before any of them serve.
pub async fn bind_peer() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Serves a configured peer on a previously bound listener.
pub fn serve_peer(listener: TcpListener, config: TestPeerConfig) {
    tokio::spawn(async move {
        Server::builder()
            .add_service(P2pServer::new(TestPeer { config }))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
}

/// One-step spawn for peers whose neighbors are known upfront.
pub async fn spawn_peer(config: TestPeerConfig) -> SocketAddr {
    let (listener, addr) = bind_peer().await;
    serve_peer(listener, config);
    addr
}

/// A wire address with the given ip and port.
pub fn net_address(ip: IpAddr, port: u32) -> NetAddress {
    let bytes = match ip {
        IpAddr::V4(ip) => ip.octets().to_vec(),
        IpAddr::V6(ip) => ip.octets().to_vec(),
    };
    NetAddress { timestamp: 0, ip: bytes, port }
}

/// A wire address pointing at a local peer.
pub fn wire_addr(addr: SocketAddr) -> NetAddress {
    net_address(addr.ip(), addr.port() as u32)
}

/// The canonical address of a local peer.
pub fn address_of(addr: SocketAddr) -> Address {
    Address::parse_seed(&addr.to_string(), DEFAULT_PORT).unwrap()
}

/// Limits tuned for fast local runs; local peers live on loopback, so the
/// routability filter is opened up.
pub fn test_limits() -> Limits {
    Limits {
        parallelism: 64,
        crawl_timeout: Duration::from_secs(60),
        survey_timeout: Duration::from_secs(30),
        patience: 2,
        min_snapshot_nodes: 10,
        accept_unroutable: true,
    }
}
