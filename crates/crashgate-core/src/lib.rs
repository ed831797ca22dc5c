//! crashgate Core - Domain types and contracts of the crash pipeline
//!
//! This crate contains the hexagonal core shared by every other crate:
//! - **Domain entities** - `Failure`, `ManagedErrorLog`, `ErrorReport`, `ErrorAttachmentLog`
//! - **Codec** - conversion between captured failures and their durable forms
//! - **Port definitions** - `IDeliveryChannel`, `IGroupListener`, `IFlagStore`, `CrashesListener`
//! - **State machine** - per-report confirmation/delivery states
//!
//! # Architecture
//!
//! The domain module is pure data and rules. Ports describe the capabilities
//! the pipeline consumes (the delivery channel, a durable flag store) and the
//! listener it exposes to the host application. Adapters and the pipeline
//! itself live in `crashgate-storage` and `crashgate-crashes`.

pub mod codec;
pub mod config;
pub mod domain;
pub mod ports;
