use crate::models::RegistryStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub active_sessions: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub active_sessions: usize,
    pub max_sessions: usize,
    pub total_messages: usize,
    pub messages_today: usize,
    pub language_distribution: BTreeMap<String, usize>,
    pub product_distribution: BTreeMap<String, usize>,
    pub timestamp: DateTime<Utc>,
}

impl StatsResponse {
    pub fn new(stats: RegistryStats, timestamp: DateTime<Utc>) -> Self {
        Self {
            active_sessions: stats.active_sessions,
            max_sessions: stats.max_sessions,
            total_messages: stats.total_messages,
            messages_today: stats.messages_today,
            language_distribution: stats.language_distribution,
            product_distribution: stats.product_distribution,
            timestamp,
        }
    }
}
