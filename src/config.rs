//! Environment configuration for the worker and the sweep job.

use crate::generator::anthropic::DEFAULT_MODEL;
use crate::processor::DEFAULT_MAX_RECEIVE_COUNT;
use crate::queue::DEFAULT_MAX_JITTER;
use crate::worker::WorkerSettings;
use anyhow::{Context, Result, bail};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue_url: String,
    pub table_name: String,
    pub api_key: String,
    pub model: String,
    pub concurrency: usize,
    pub max_messages: i32,
    pub idle_base: Duration,
    pub idle_max: Duration,
    pub wait_time: Duration,
    pub visibility_timeout: Duration,
    pub max_receive_count: u32,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let concurrency: usize = parse_or(&lookup, "WORKER_CONCURRENCY", 1)?;
        if concurrency == 0 {
            bail!("WORKER_CONCURRENCY must be at least 1");
        }

        let idle_base = Duration::from_millis(parse_or(&lookup, "WORKER_IDLE_BASE_MS", 1_000)?);
        let idle_max = Duration::from_millis(parse_or(&lookup, "WORKER_IDLE_MAX_MS", 30_000)?);
        if idle_base.is_zero() || idle_max < idle_base {
            bail!("WORKER_IDLE_BASE_MS must be positive and no larger than WORKER_IDLE_MAX_MS");
        }

        let visibility_timeout =
            Duration::from_secs(parse_or(&lookup, "QUEUE_VISIBILITY_TIMEOUT_SECONDS", 60)?);
        if visibility_timeout.is_zero() {
            bail!("QUEUE_VISIBILITY_TIMEOUT_SECONDS must be positive");
        }

        Ok(Self {
            queue_url: required(&lookup, "SUMMARY_QUEUE_URL")?,
            table_name: required(&lookup, "DYNAMODB_TABLE")?,
            api_key: required(&lookup, "ANTHROPIC_API_KEY")?,
            model: optional(&lookup, "SUMMARY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            concurrency,
            max_messages: parse_or(&lookup, "WORKER_MAX_MESSAGES", 10i32)?.clamp(1, 10),
            idle_base,
            idle_max,
            wait_time: Duration::from_secs(parse_or(&lookup, "QUEUE_WAIT_SECONDS", 20)?),
            visibility_timeout,
            max_receive_count: parse_or(&lookup, "MAX_RECEIVE_COUNT", DEFAULT_MAX_RECEIVE_COUNT)?,
        })
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            concurrency: self.concurrency,
            max_messages: self.max_messages,
            idle_base: self.idle_base,
            idle_max: self.idle_max,
        }
    }
}

/// What the scheduled sweep needs: where to read item ids and where to
/// publish tasks.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub queue_url: String,
    pub table_name: String,
    pub max_jitter: Duration,
}

impl SweepConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            queue_url: required(&lookup, "SUMMARY_QUEUE_URL")?,
            table_name: required(&lookup, "DYNAMODB_TABLE")?,
            max_jitter: max_jitter(&lookup)?,
        })
    }
}

fn max_jitter(lookup: &impl Fn(&str) -> Option<String>) -> Result<Duration> {
    parse_or(lookup, "QUEUE_MAX_JITTER_SECONDS", DEFAULT_MAX_JITTER.as_secs())
        .map(Duration::from_secs)
}

// Blank values count as unset.
fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    optional(lookup, name).with_context(|| format!("{} environment variable must be set", name))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match optional(lookup, name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be a valid number, got {:?}: {}", name, raw, e)),
    }
}
