// SPDX-License-Identifier: MIT

//! Wire format shared by the Edge and the Worker: the message envelope,
//! the closed tag set, and the request/response kind taxonomy.
//!
//! Payload bodies (`data`) are opaque JSON — the OpenAI schemas are never
//! parsed here, only carried.

pub mod envelope;
pub mod kind;
pub mod tag;

pub use envelope::{Envelope, EnvelopeError};
pub use kind::{Mode, RequestKind};
pub use tag::MessageTag;
