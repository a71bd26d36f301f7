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

use crate::{helpers, Address, Network};
use spectre_crawler_protowire::{
    p2p_client::P2pClient,
    NetAddress,
    Payload,
    SpectredMessage,
    VersionMessage,
};

use std::time::Duration;
use thiserror::Error;
use tokio::{sync::mpsc, time};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{codec::Streaming, transport::Endpoint};

/// How long the channel may take to become ready.
pub const CHANNEL_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// The protocol version that introduced the distinct `ready` phase; earlier
/// peers treat `verack` as the final handshake step.
pub const READY_PROTOCOL_VERSION: u32 = 4;

/// The protocol version assumed until the peer announces its own.
const BASELINE_PROTOCOL_VERSION: u32 = 2;

/// Frames queued for sending before the stream applies backpressure.
const OUTBOUND_QUEUE_SIZE: usize = 64;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The channel didn't become ready in time; displayed as the bare tag the
    /// peer record carries.
    #[error("timeout")]
    Timeout,
    #[error("connect: {0}")]
    Connect(#[from] tonic::transport::Error),
    #[error("stream ended during handshake")]
    HandshakeEof,
    #[error("stream closed")]
    StreamClosed,
    #[error("rpc: {0}")]
    Rpc(#[from] tonic::Status),
}

/// One outbound session against a single peer. The stream is attached and the
/// handshake completed by [`PeerSession::connect`]; afterwards the session
/// only serves address requests.
pub struct PeerSession {
    outbound: mpsc::Sender<SpectredMessage>,
    inbound: Streaming<SpectredMessage>,
    pub peer_id: Vec<u8>,
    pub peer_version: u32,
    pub peer_user_agent: String,
}

impl PeerSession {
    /// Opens the bidirectional stream to `address` and performs the handshake.
    /// The channel must become ready within [`CHANNEL_READY_TIMEOUT`].
    pub async fn connect(
        address: &Address,
        network: Network,
        local_id: Vec<u8>,
        user_agent: &str,
    ) -> Result<Self, SessionError> {
        let endpoint = Endpoint::from_shared(address.endpoint_uri())?.connect_timeout(CHANNEL_READY_TIMEOUT);
        let channel = match time::timeout(CHANNEL_READY_TIMEOUT, endpoint.connect()).await {
            Ok(connected) => connected?,
            Err(_) => return Err(SessionError::Timeout),
        };
        let mut client = P2pClient::new(channel);

        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let mut inbound = client.message_stream(ReceiverStream::new(outbound_rx)).await?.into_inner();

        // The peer speaks first; feed its frames through the state machine
        // until the exchange settles.
        let mut handshake = Handshake::new(network, local_id, user_agent);
        while !handshake.is_done() {
            let frame = inbound.message().await?.ok_or(SessionError::HandshakeEof)?;
            trace!("got a {} frame from {address}", frame.payload_name());
            let Some(payload) = &frame.payload else {
                debug!("got a frame with no payload from {address}");
                continue;
            };
            for reply in handshake.on_payload(payload) {
                outbound.send(reply).await.map_err(|_| SessionError::StreamClosed)?;
            }
        }
        debug!("handshake with {address} complete (protocol version {})", handshake.peer_version);

        Ok(Self {
            outbound,
            inbound,
            peer_id: handshake.peer_id,
            peer_version: handshake.peer_version,
            peer_user_agent: handshake.peer_user_agent,
        })
    }

    /// One request/reply round trip for the peer's known-addresses table. The
    /// peer may interleave its own `requestAddresses`, which is answered with
    /// an empty list; all other frames are ignored.
    pub async fn request_addresses(&mut self) -> Result<Vec<NetAddress>, SessionError> {
        self.send(SpectredMessage::request_addresses()).await?;
        loop {
            let frame = self.inbound.message().await?.ok_or(SessionError::StreamClosed)?;
            match frame.payload {
                Some(Payload::Addresses(message)) => return Ok(message.address_list),
                Some(Payload::RequestAddresses(..)) => {
                    // Courtesy reply; the crawler has nothing to share.
                    self.send(SpectredMessage::addresses(Vec::new())).await?;
                }
                Some(ref other) => trace!("ignoring a {} frame during the address exchange", other.name()),
                None => debug!("got a frame with no payload during the address exchange"),
            }
        }
    }

    /// Consumes the session, ending the outbound stream. Every send is
    /// awaited at the call site, so there is nothing left to drain here;
    /// dropping mid-exchange instead aborts the call, which is exactly what
    /// cancellation wants.
    pub fn close(self) {}

    async fn send(&mut self, message: SpectredMessage) -> Result<(), SessionError> {
        self.outbound.send(message).await.map_err(|_| SessionError::StreamClosed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HandshakeState {
    /// Waiting for the peer's `version` announcement.
    Init,
    /// Our `version` is out; waiting for the peer's `verack`.
    AwaitAck,
    /// Waiting for the peer's `ready` (protocol version >= 4 only).
    AwaitReady,
    Done,
}

/// The handshake as an explicit state machine: fed one inbound payload at a
/// time, returning the frames to send in response. Keeping it synchronous
/// sidesteps interleaving hazards and makes the exchange testable without a
/// transport.
struct Handshake {
    state: HandshakeState,
    network: Network,
    local_id: Vec<u8>,
    user_agent: String,
    peer_id: Vec<u8>,
    peer_version: u32,
    peer_user_agent: String,
}

impl Handshake {
    fn new(network: Network, local_id: Vec<u8>, user_agent: &str) -> Self {
        Self {
            state: HandshakeState::Init,
            network,
            local_id,
            user_agent: user_agent.to_owned(),
            peer_id: Vec::new(),
            peer_version: BASELINE_PROTOCOL_VERSION,
            peer_user_agent: String::new(),
        }
    }

    fn is_done(&self) -> bool {
        self.state == HandshakeState::Done
    }

    fn on_payload(&mut self, payload: &Payload) -> Vec<SpectredMessage> {
        match (self.state, payload) {
            (HandshakeState::Init, Payload::Version(version)) => {
                self.peer_id = version.id.clone();
                self.peer_version = version.protocol_version;
                self.peer_user_agent = version.user_agent.clone();
                self.state = HandshakeState::AwaitAck;
                vec![SpectredMessage::version(self.local_version())]
            }
            (HandshakeState::AwaitAck, Payload::Verack(..)) => {
                self.state = match self.peer_version < READY_PROTOCOL_VERSION {
                    true => HandshakeState::Done,
                    false => HandshakeState::AwaitReady,
                };
                vec![SpectredMessage::verack()]
            }
            (HandshakeState::AwaitAck | HandshakeState::AwaitReady, Payload::Ready(..)) => {
                self.state = HandshakeState::Done;
                vec![SpectredMessage::ready()]
            }
            (HandshakeState::Done, _) => Vec::new(),
            (_, unexpected) => {
                debug!("during handshake, got an unexpected {} frame", unexpected.name());
                Vec::new()
            }
        }
    }

    /// Our own announcement, echoing the protocol version the peer advertised.
    fn local_version(&self) -> VersionMessage {
        VersionMessage {
            protocol_version: self.peer_version,
            timestamp: helpers::unix_now(),
            id: self.local_id.clone(),
            user_agent: self.user_agent.clone(),
            network: self.network.id().to_owned(),
        }
    }
}
