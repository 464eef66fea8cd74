//! DC Wage library crate.
//!
//! This crate exposes the bi-weekly wage engine for daily contractors
//! as reusable modules.  Records flow downstream through
//! [`attendance`] collection, [`normalize`] and [`discrepancy`]
//! detection into the [`calculator`]; the [`engine`] runs contractors
//! in parallel and the [`service`] commits the resulting
//! [`period::WagePeriod`].  The [`api`] module embeds the period
//! actions in an HTTP router.

pub mod api;
pub mod attendance;
pub mod cache;
pub mod calculator;
pub mod config;
pub mod discrepancy;
pub mod engine;
pub mod error;
pub mod models;
pub mod normalize;
pub mod period;
pub mod retry;
pub mod service;
pub mod social_security;
pub mod source;
pub mod store;
