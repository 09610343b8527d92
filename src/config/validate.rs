// src/config/validate.rs

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, RawConfigFile, StoreSection};
use crate::engine::SchedulerOptions;
use crate::errors::{JudgedagError, Result};
use crate::process::ManagerOptions;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = JudgedagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let manager = manager_options(&raw)?;
        let scheduler = scheduler_options(&raw)?;

        if raw.dispatcher.queue_capacity == 0 {
            return Err(JudgedagError::ConfigError(
                "[dispatcher].queue_capacity must be >= 1 (got 0)".to_string(),
            ));
        }

        let bind: SocketAddr = raw.server.bind.parse().map_err(|e| {
            JudgedagError::ConfigError(format!(
                "[server].bind '{}' is not a socket address: {e}",
                raw.server.bind
            ))
        })?;

        validate_store(&raw.store)?;

        Ok(ConfigFile::new_unchecked(
            manager,
            scheduler,
            raw.dispatcher.queue_capacity,
            bind,
            raw.store,
        ))
    }
}

fn manager_options(raw: &RawConfigFile) -> Result<ManagerOptions> {
    let lock_ttl = duration_field("[manager].lock_ttl", &raw.manager.lock_ttl)?;
    if lock_ttl.is_zero() {
        return Err(JudgedagError::ConfigError(
            "[manager].lock_ttl must be greater than zero".to_string(),
        ));
    }
    if raw.manager.admission_capacity == 0 {
        return Err(JudgedagError::ConfigError(
            "[manager].admission_capacity must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(ManagerOptions {
        lock_ttl,
        admission_capacity: raw.manager.admission_capacity,
    })
}

fn scheduler_options(raw: &RawConfigFile) -> Result<SchedulerOptions> {
    let task_timeout = duration_field("[scheduler].task_timeout", &raw.scheduler.task_timeout)?;

    let mut timeouts = HashMap::new();
    for (kind, value) in raw.scheduler.timeouts.iter() {
        let field = format!("[scheduler.timeouts].\"{kind}\"");
        timeouts.insert(kind.clone(), duration_field(&field, value)?);
    }

    Ok(SchedulerOptions {
        task_timeout,
        timeouts,
    })
}

fn validate_store(store: &StoreSection) -> Result<()> {
    let mut seen = BTreeSet::new();
    for bp in store.blueprint.iter() {
        if !seen.insert(bp.id) {
            return Err(JudgedagError::ConfigError(format!(
                "[[store.blueprint]] id {} is declared more than once",
                bp.id
            )));
        }
    }
    Ok(())
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| JudgedagError::ConfigError(format!("{field}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(text)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn empty_file_gets_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.manager.lock_ttl, Duration::from_secs(3));
        assert_eq!(cfg.manager.admission_capacity, 128);
        assert_eq!(cfg.scheduler.task_timeout, Duration::from_secs(600));
        assert_eq!(cfg.queue_capacity, 64);
        assert_eq!(cfg.bind.port(), 8080);
    }

    #[test]
    fn per_type_timeouts_override_default() {
        let cfg = parse(
            r#"
            [scheduler]
            task_timeout = "30s"
            [scheduler.timeouts]
            "basic/evaluate" = "500ms"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.scheduler.timeout_for("basic/evaluate"), Duration::from_millis(500));
        assert_eq!(cfg.scheduler.timeout_for("compile"), Duration::from_secs(30));
    }

    #[test]
    fn rejects_zero_ttl_and_capacity() {
        let err = parse("[manager]\nlock_ttl = \"0s\"").unwrap_err();
        assert!(err.to_string().contains("lock_ttl"));

        let err = parse("[dispatcher]\nqueue_capacity = 0").unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }

    #[test]
    fn rejects_bad_bind_and_duration() {
        assert!(parse("[server]\nbind = \"localhost\"").is_err());
        let err = parse("[scheduler.timeouts]\nrun = \"3 days\"").unwrap_err();
        assert!(err.to_string().contains("[scheduler.timeouts].\"run\""));
    }

    #[test]
    fn rejects_duplicate_blueprint_ids() {
        let err = parse(
            r#"
            [[store.blueprint]]
            id = 1
            path = "a.json"
            [[store.blueprint]]
            id = 1
            path = "b.json"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
