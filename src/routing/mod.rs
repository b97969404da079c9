//! Intent routing
//!
//! A request is classified into one label of a closed [`RouteSet`] by a
//! constrained completion call, then answered by the handler registered for
//! that label. Unrecognized classifier output becomes [`Route::Unknown`] and
//! gets a fixed reply; no handler runs.
//!
//! Tool-backed handlers use the two-round exchange in [`invoke`].

pub mod agent;
pub mod handler;
pub mod invoke;
pub mod route;
pub mod router;

pub use agent::{Response, RoutingAgent};
pub use handler::{Dispatcher, Handler, PlainHandler, Reply, ReplyKind, ToolHandler, UNROUTED_MESSAGE, UnroutedHandler};
pub use invoke::{InvocationFailure, InvocationOptions, InvocationOutcome, invoke_with_tools};
pub use route::{MatchMode, Route, RouteRule, RouteSet, UNKNOWN_LABEL};
pub use router::{CLASSIFIER_TEMPERATURE, Router, RouterOptions, RoutingDecision};
