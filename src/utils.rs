use std::{
    path::PathBuf,
    sync::atomic::{AtomicI64, Ordering},
};

use tracing_subscriber::EnvFilter;

/// 获取当前时间
pub fn local_now() -> time::OffsetDateTime {
    time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc())
}

/// Milliseconds since the unix epoch.
pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

static LAST_MINTED: AtomicI64 = AtomicI64::new(0);

/// Mint a chapter id from the current timestamp.
///
/// The store only assigns ids to top-level records, nested chapters get theirs
/// on the client. Ids are strictly increasing within the process, so several
/// chapters minted in the same millisecond stay distinct.
pub fn mint_chapter_id() -> i64 {
    let now = now_millis();
    let mut last = LAST_MINTED.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_MINTED.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// 初始化日志
pub fn init_log(log: Option<PathBuf>) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber_builder = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_thread_names(true);
    let (non_blocking, guard) = if let Some(log) = log {
        // output to file，daily rotate, non-blocking
        if !log.is_dir() {
            anyhow::bail!("log path {} is not a directory", log.display());
        }
        let file_appender = tracing_appender::rolling::daily(log, "lms.log");
        tracing_appender::non_blocking(file_appender)
    } else {
        // output to stderr, stdout carries command output
        tracing_appender::non_blocking(std::io::stderr())
    };
    tracing::subscriber::set_global_default(
        subscriber_builder.with_writer(non_blocking).finish(),
    )?;
    Ok(guard)
}
