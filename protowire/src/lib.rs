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

//! Generated gRPC bindings for the spectred p2p wire protocol.
//!
//! The schema is an external contract: the checked-in `.proto` files mirror
//! the upstream `protowire` package, trimmed to the messages the crawler
//! exchanges. Everything in this crate besides the few helpers below comes
//! out of `tonic-build`.

#![forbid(unsafe_code)]

tonic::include_proto!("protowire");

pub use spectred_message::Payload;

impl Payload {
    /// Returns the wire name of the payload variant, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Addresses(..) => "addresses",
            Self::RequestAddresses(..) => "requestAddresses",
            Self::Version(..) => "version",
            Self::Verack(..) => "verack",
            Self::Ready(..) => "ready",
        }
    }
}

impl SpectredMessage {
    /// Wraps the given payload in a frame.
    pub fn from_payload(payload: Payload) -> Self {
        Self { payload: Some(payload) }
    }

    /// Returns a frame announcing the local node to a peer.
    pub fn version(message: VersionMessage) -> Self {
        Self::from_payload(Payload::Version(message))
    }

    /// Returns a frame acknowledging the peer's `version`.
    pub fn verack() -> Self {
        Self::from_payload(Payload::Verack(VerackMessage {}))
    }

    /// Returns a frame confirming the post-verack `ready` phase.
    pub fn ready() -> Self {
        Self::from_payload(Payload::Ready(ReadyMessage {}))
    }

    /// Returns a frame asking the peer for its known-addresses table.
    pub fn request_addresses() -> Self {
        Self::from_payload(Payload::RequestAddresses(RequestAddressesMessage {}))
    }

    /// Returns a frame carrying a (possibly empty) address list.
    pub fn addresses(address_list: Vec<NetAddress>) -> Self {
        Self::from_payload(Payload::Addresses(AddressesMessage { address_list }))
    }

    /// Returns the name of the frame's payload variant; a frame with no
    /// payload set is reported as `"empty"`.
    pub fn payload_name(&self) -> &'static str {
        self.payload.as_ref().map(Payload::name).unwrap_or("empty")
    }
}
