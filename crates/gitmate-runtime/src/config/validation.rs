//! Consistency checks run before a runtime is built from a configuration.

use gitmate_framework::TaskQueue;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, ExecutionConfig, GitmateConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &GitmateConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_bot_config(&config.bot)?;
    validate_execution_config(&config.execution)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::Required("logging.file_path"));
    }
    Ok(())
}

fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    // An empty marker matches every comment and would veto all comment events.
    if bot.signature.trim().is_empty() {
        return Err(ConfigError::Required("bot.signature"));
    }
    Ok(())
}

fn validate_execution_config(execution: &ExecutionConfig) -> ConfigResult<()> {
    if execution.time_limit_secs == 0 {
        return Err(ConfigError::Invalid("time limit must be greater than 0".into()));
    }

    if execution.queue_capacity == 0 {
        return Err(ConfigError::Invalid(
            "queue capacity must be greater than 0".into(),
        ));
    }

    if execution.enqueue_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "enqueue timeout must be greater than 0".into(),
        ));
    }

    for queue in TaskQueue::ALL {
        if execution.workers.for_queue(queue) == 0 {
            return Err(ConfigError::Invalid(format!(
                "queue '{queue}' needs at least one worker"
            )));
        }
    }

    Ok(())
}
