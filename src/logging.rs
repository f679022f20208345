use std::io::IsTerminal;
use tracing::Level;
use tracing_subscriber::{
    fmt::{format::FmtSpan, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize the logging and error reporting infrastructure
pub fn init(verbosity: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    #[cfg(feature = "cli")]
    color_eyre::install()?;

    let log_level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // RUST_LOG overrides the verbosity flag
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("sqlmorph={},tokio_postgres=warn", log_level))
    });

    let is_terminal = std::io::stdout().is_terminal();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_ansi(is_terminal)
        .with_timer(UtcTime::rfc_3339())
        .with_span_events(FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

#[macro_export]
macro_rules! log_error {
    ($err:expr) => {
        tracing::error!(
            error = %$err,
            "Operation failed"
        );
        if let Some(suggestion) = $crate::error::suggest_fix(&$err) {
            tracing::info!("{}", suggestion);
        }
    };
}

/// Format output for CLI with colors
#[cfg(feature = "cli")]
pub mod output {
    use console::{style, Emoji};
    use std::fmt::Display;

    static CHECKMARK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
    static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[FAIL] ");
    static ARROW: Emoji<'_, '_> = Emoji("→ ", "-> ");
    static WARNING: Emoji<'_, '_> = Emoji("⚠ ", "[WARN] ");
    static INFO: Emoji<'_, '_> = Emoji("ℹ ", "[INFO] ");

    pub fn success(message: impl Display) {
        println!("{} {}", style(CHECKMARK).green(), message);
    }

    pub fn error(message: impl Display) {
        eprintln!("{} {}", style(CROSS).red(), style(message).red());
    }

    pub fn warning(message: impl Display) {
        println!("{} {}", style(WARNING).yellow(), style(message).yellow());
    }

    pub fn info(message: impl Display) {
        println!("{} {}", style(INFO).blue(), message);
    }

    pub fn step(message: impl Display) {
        println!("{} {}", style(ARROW).cyan(), message);
    }

    pub fn header(message: impl Display) {
        println!("\n{}", style(message).bold().underlined());
    }
}

/// Helper to format durations in human-readable format
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs == 0 {
        format!("{}ms", millis)
    } else if secs < 60 {
        format!("{}.{:03}s", secs, millis)
    } else {
        let mins = secs / 60;
        let secs = secs % 60;
        format!("{}m {}s", mins, secs)
    }
}
