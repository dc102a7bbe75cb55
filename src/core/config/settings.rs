use std::time::Duration;

use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_code_attempt_scope, parse_environment,
    parse_positive_usize, parse_socket_addr, parse_u16, parse_u32, parse_u64,
};
use super::types::{
    ConfigError, DatabaseSettings, RedisSettings, RuntimeSettings, Settings, TelemetrySettings,
    WorkerSettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let environment = parse_environment(
            env_optional("QUIZ_SCORING_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("QUIZ_SCORING_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "quizscoring");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "quiz_scoring");
        let database_url = env_optional("DATABASE_URL");
        let max_connections = parse_u32(
            "DATABASE_MAX_CONNECTIONS",
            env_or_default("DATABASE_MAX_CONNECTIONS", "10"),
        )?;

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let queue_name = env_or_default("SCORING_QUEUE_NAME", "resultQueue");
        let concurrency = parse_positive_usize(
            "SCORING_WORKER_CONCURRENCY",
            env_or_default("SCORING_WORKER_CONCURRENCY", "2"),
        )?;
        let batch_size = parse_positive_usize(
            "SCORING_BATCH_SIZE",
            env_or_default("SCORING_BATCH_SIZE", "100"),
        )?;
        let poll_interval_ms = parse_u64(
            "SCORING_POLL_INTERVAL_MS",
            env_or_default("SCORING_POLL_INTERVAL_MS", "2000"),
        )?;
        let max_attempts =
            parse_u32("SCORING_MAX_ATTEMPTS", env_or_default("SCORING_MAX_ATTEMPTS", "3"))?;
        let job_lease_secs = parse_u64(
            "SCORING_JOB_LEASE_SECS",
            env_or_default("SCORING_JOB_LEASE_SECS", "600"),
        )?;
        let code_attempt_scope =
            parse_code_attempt_scope(env_or_default("SCORING_CODE_ATTEMPT_SCOPE", "all"))?;
        let ack_failures =
            env_optional("SCORING_ACK_FAILURES").map(|value| parse_bool(&value)).unwrap_or(false);

        let log_level = env_or_default("QUIZ_SCORING_LOG_LEVEL", "info");
        let json =
            env_optional("QUIZ_SCORING_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_listen_addr = parse_socket_addr(
            "PROMETHEUS_LISTEN_ADDR",
            env_or_default("PROMETHEUS_LISTEN_ADDR", "0.0.0.0:9464"),
        )?;

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            worker: WorkerSettings {
                queue_name,
                concurrency,
                batch_size,
                poll_interval: Duration::from_millis(poll_interval_ms),
                max_attempts,
                job_lease: Duration::from_secs(job_lease_secs),
                code_attempt_scope,
                ack_failures,
            },
            telemetry: TelemetrySettings {
                log_level,
                json,
                prometheus_enabled,
                prometheus_listen_addr,
            },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn worker(&self) -> &WorkerSettings {
        &self.worker
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.queue_name.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidValue {
                field: "SCORING_QUEUE_NAME",
                value: self.worker.queue_name.clone(),
            });
        }

        if self.worker.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SCORING_MAX_ATTEMPTS",
                value: self.worker.max_attempts.to_string(),
            });
        }

        if self.worker.job_lease.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "SCORING_JOB_LEASE_SECS",
                value: self.worker.job_lease.as_secs().to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATABASE_MAX_CONNECTIONS",
                value: self.database.max_connections.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}
