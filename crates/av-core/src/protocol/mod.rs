//! The join-map bridge protocol.
//!
//! - [`join_map`] – join addresses, offsets, synthesis and overrides.
//! - [`link`] – the control-surface link contract.
//! - [`binding`] – deferred binding and the join binder helper.
//! - [`bridge`] – the `Bridgeable` contract and per-bridge join tables.
//! - [`ir_joins`] – the standard IR command join table.

pub mod binding;
pub mod bridge;
pub mod ir_joins;
pub mod join_map;
pub mod link;
