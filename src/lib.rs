//! Stock Ledger Engine Library
//!
//! This crate provides the core functionality for the multi-branch stock
//! ledger: per-branch stock records with an embedded movement log, an
//! append-only history ledger, the point-of-sale transaction processor,
//! the return approval workflow, and the atomic unit-of-work coordinator
//! that ties every multi-record mutation together and emits post-commit
//! domain events.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod commands;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Bundle of the engine's service facades.
#[derive(Clone)]
pub struct AppServices {
    pub inventory: services::InventoryService,
    pub history: services::HistoryService,
    pub sales: services::SaleService,
    pub returns: services::ReturnService,
}

/// Shared application state handed to embedding layers (HTTP routers,
/// schedulers, test harnesses).
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
}

impl AppState {
    /// Wires the service graph over an established connection pool.
    ///
    /// Returns the receiving half of the domain-event channel; the
    /// caller decides whether to drain it with `events::process_events`
    /// or its own subscriber.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
    ) -> (Self, AppServices, mpsc::Receiver<events::Event>) {
        let (event_sender, event_rx) = events::channel(config.event_buffer_size);
        let event_sender = Arc::new(event_sender);

        let app_services = AppServices {
            inventory: services::InventoryService::new(db.clone(), event_sender.clone()),
            history: services::HistoryService::new(db.clone()),
            sales: services::SaleService::new(db.clone(), event_sender.clone()),
            returns: services::ReturnService::new(db.clone(), event_sender.clone()),
        };

        (
            Self {
                db,
                config,
                event_sender,
            },
            app_services,
            event_rx,
        )
    }
}
