//! Slack Integration - Socket Mode bot interface
//!
//! This crate provides the Slack interface for intake:
//! - **Socket Mode** (`socket`) - WebSocket connection to Slack (no public URL needed)
//! - **Events** (`events`) - Messages, button clicks, modal submissions
//! - **Handlers** (`handlers`) - The workflow step handlers behind each event kind
//! - **Retrying API client** (`api`) - Rate-limit-aware outbound call wrapper
//! - **Block Kit** (`blocks`) - Message and modal builders
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and subscribe to message, interaction, and view events
//! 3. Set env vars: `INTAKE_SLACK_APP_TOKEN`, `INTAKE_SLACK_BOT_TOKEN`,
//!    `INTAKE_RELAY_ENDPOINT_URL`
//!
//! # Architecture
//!
//! ```text
//! Slack Events → EventDispatcher → Step Handlers → Workflow Engine (core)
//!                     ↓                  ↓
//!               Block Kit UI ←  Retrying API Client → Slack Web API
//!                                        ↓
//!                                 Outbound Relay → collection endpoint
//! ```
//!
//! Conversation state never lives in this process: each UI artifact carries
//! an opaque context token, and every inbound event is handled from scratch
//! off the token it returns.
//!
//! # Key Types
//!
//! - `SocketModeRunner` - WebSocket event loop with reconnection logic
//! - `EventDispatcher` - Routes events to the registered step handler
//! - `execute_with_retry` - Bounded retry-on-rate-limit for outbound calls
//! - `HandlerDeps` - Collaborators injected into every handler invocation

pub mod api;
pub mod blocks;
pub mod events;
pub mod handlers;
pub mod socket;
