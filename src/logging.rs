use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Once;

use chrono::Utc;

static INIT: Once = Once::new();

/// Install the global logger. Only the first call has any effect.
///
/// `level` overrides `RUST_LOG` when given. Output goes to stderr so it
/// never interleaves with the dashboard on stdout, or to `file` when set.
pub fn init(level: Option<&str>, file: Option<&Path>) {
    INIT.call_once(|| {
        let mut init_warnings = Vec::new();
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        if let Some(level) = level {
            builder.parse_filters(level);
        }

        builder.format(|buf, record| {
            let ts = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
            writeln!(
                buf,
                "{} {} {} {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        });

        builder.target(env_logger::Target::Stderr);
        if let Some(path) = file {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                if let Err(err) = std::fs::create_dir_all(dir) {
                    init_warnings.push(format!("failed to create log dir: {}", err));
                }
            }
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(err) => init_warnings.push(format!(
                    "failed to open log file ({}): {}",
                    path.display(),
                    err
                )),
            }
        }

        let _ = builder.try_init();
        for warning in init_warnings {
            log::warn!("{}", warning);
        }
    });
}
