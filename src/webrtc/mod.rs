//! WebRTC play session
//!
//! This module implements the client side of an SRS play session:
//! - Endpoint discovery from the player page
//! - Offer/answer exchange over the HTTP play API
//! - Connectivity monitoring (event driven, bounded by a deadline)
//! - Inbound track bookkeeping and frame routing
//! - Idempotent teardown
//!
//! Architecture:
//! ```text
//! Player page ----> EndpointResolver
//!                        |
//!                        v
//! API Server <-- SDP --- SessionNegotiator ---> MediaTransport (PeerConnection)
//!                                                    |            |
//!                                       connectivity |            | tracks
//!                                                    v            v
//!                                        ConnectionMonitor   TrackRegistry --> FrameSink
//!                                                    |            |
//!                                                    +-----+------+
//!                                                          v
//!                                                 ShutdownController
//! ```

pub mod monitor;
pub mod negotiator;
pub mod peer;
pub mod resolver;
pub mod session;
pub mod shutdown;
pub mod signaling;
pub mod track;
pub mod transport;

pub use monitor::{ConnectionMonitor, MonitorOutcome};
pub use negotiator::{parse_play_response, stream_name, SessionNegotiator};
pub use peer::PeerConnection;
pub use resolver::{EndpointResolver, EndpointSource, ResolvedEndpoint};
pub use session::Session;
pub use shutdown::{SessionReport, ShutdownController, TrackSummary};
pub use signaling::{ConnectionState, IceConnectivity, MediaKind, NegotiationResult};
pub use track::{FrameSource, MediaFrame, TrackHandle, TrackRegistry};
pub use transport::MediaTransport;
