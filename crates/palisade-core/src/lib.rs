//! # Palisade Gateway Core
//!
//! The routing, resilience, and composition engine for a multi-tenant,
//! feature-flag-aware reverse proxy. This crate is framework-agnostic: it
//! accepts an inbound request shape ([`routing::dispatcher::RequestContext`])
//! and produces an outbound response shape
//! ([`proxy::backend_proxy::ProxyResponse`]), leaving the HTTP server, the
//! router binding, and configuration *loading* to a host binary such as
//! `palisade-server`.
//!
//! ## Request lifecycle
//!
//! A request enters through [`gateway::GatewayModule::dispatch`], which
//! resolves a tenant's [`routing::dispatcher::Dispatcher`] and runs it
//! through, in order: tenant-header enforcement, cache lookup, route/backend
//! resolution (composite route, explicit route, default backend), feature
//! flag gating, circuit-breaker admission, the backend proxy, cache storage,
//! and an optional dry-run shadow launch.
//!
//! ## Module organization
//!
//! - [`gateway`] — module lifecycle, tenant events, runtime mutation, the
//!   external capability traits (`RouteRegistrar`, `HttpTransport`,
//!   `TenantConfigStore`).
//! - [`config`] — tenant config merging and comprehensive validation.
//! - [`routing`] — path matching and request dispatch.
//! - [`proxy`] — path/header rewriting and the pooled backend HTTP client.
//! - [`resilience`] — per-backend circuit breakers.
//! - [`cache`] — the TTL+LRU response cache with single-flight semantics.
//! - [`health`] — background DNS + HTTP health checking.
//! - [`composite`] — multi-backend fan-out and response transformation.
//! - [`feature_flags`] — priority-ordered flag evaluator aggregation.
//! - [`dryrun`] — shadow traffic and comparison.
//! - [`events`] — the structured event sink abstraction.
//! - [`models`] — shared data types and the error taxonomy.
//! - [`logs`] — structured logging setup.
//! - [`utils`] — small cross-cutting helpers (hop-by-hop header handling).

pub mod cache;
pub mod composite;
pub mod config;
pub mod dryrun;
pub mod events;
pub mod feature_flags;
pub mod gateway;
pub mod health;
pub mod logs;
pub mod models;
pub mod proxy;
pub mod resilience;
pub mod routing;
pub mod utils;
