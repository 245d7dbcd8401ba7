//! The forwarding pipeline.
//!
//! Every inbound message flows through:
//! 1. `SourceSelector` — is this chat monitored at all?
//! 2. `extractor` — pull node links out of the text
//! 3. `FilterPolicy` — forward/drop decision
//! 4. `planner` — build the single outbound payload
//! 5. `RateLimitedSender` — per-destination delivery with retry,
//!    fanned out as independent tasks by the `ForwardingPipeline`

pub mod extractor;
pub mod filter;
pub mod planner;
pub mod processor;
pub mod sender;
pub mod types;
