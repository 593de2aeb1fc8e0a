#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::prelude::*;

use apiviz::app::api_overview::ApiOverview;
use apiviz::app::config::Theme;
use apiviz::app::history::{FileHistoryBackend, HistoryBackend, HistoryStore};
use apiviz::app::sandbox::{build_document, sanitize_artifact, SandboxContextId};
use apiviz::app::settings::WidgetSettings;

const USAGE: &str = "\
apiviz - natural-language API visualizations

USAGE:
    apiviz history                 List saved visualizations
    apiviz render <file>           Print a generated artifact as a bridge-ready document
    apiviz show <index>            Open a saved visualization
        --base-url <url>           Base URL data requests are resolved against
        --api <file>               API description to attach
        --theme <light|dark|auto>  Theme override for this window
    apiviz overview <file>         List the endpoints of an API description
    apiviz version

OPTIONS:
    --settings <file>              Settings file (default: config dir/apiviz/settings.toml)
";

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    History,
    Render(PathBuf),
    Show {
        index: usize,
        base_url: Option<String>,
        api: Option<PathBuf>,
        theme: Option<Theme>,
    },
    Overview(PathBuf),
    Version,
    Help,
}

#[derive(Debug)]
struct CliArgs {
    command: CliCommand,
    settings: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut settings = None;
    let mut base_url = None;
    let mut api = None;
    let mut theme = None;
    let mut positional = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--settings" => settings = Some(PathBuf::from(iter.next().context("--settings needs a file")?)),
            "--base-url" => base_url = Some(iter.next().context("--base-url needs a URL")?.clone()),
            "--api" => api = Some(PathBuf::from(iter.next().context("--api needs a file")?)),
            "--theme" => theme = Some(iter.next().context("--theme needs a value")?.parse::<Theme>()?),
            "-h" | "--help" => positional = vec!["help".to_string()],
            _ => positional.push(arg.clone()),
        }
    }

    let command = match positional.first().map(String::as_str) {
        None | Some("help") => CliCommand::Help,
        Some("history") => CliCommand::History,
        Some("version") => CliCommand::Version,
        Some("render") => CliCommand::Render(PathBuf::from(
            positional.get(1).context("render needs a file")?,
        )),
        Some("overview") => CliCommand::Overview(PathBuf::from(
            positional.get(1).context("overview needs a file")?,
        )),
        Some("show") => {
            let index = positional
                .get(1)
                .context("show needs a history index")?
                .parse()
                .context("history index must be a number")?;
            CliCommand::Show {
                index,
                base_url,
                api,
                theme,
            }
        }
        Some(other) => bail!("Unknown command '{}'", other),
    };

    Ok(CliArgs { command, settings })
}

fn init_logging() {
    let Some(proj_dirs) = directories::ProjectDirs::from("com", "", "apiviz") else {
        return;
    };
    let log_dir = proj_dirs.data_dir().join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let log_path = log_dir.join("apiviz.log");

    let file = match std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return;
        }
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = file.metadata() {
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            if let Err(e) = std::fs::set_permissions(&log_path, perms) {
                eprintln!("[SECURITY] Failed to set log file permissions: {}", e);
            }
        }
    }

    // RUST_LOG wins over the built-in levels
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("apiviz=info,reqwest=warn,hyper=warn"));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false),
    );

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Tracing subscriber already set");
        return;
    }

    // Bridge log crate events to tracing (wry, tao and the log_* macros)
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to initialize log-to-tracing bridge: {}", e);
    }

    tracing::info!("Logging initialized to: {:?}", log_path);
}

fn setup_panic_handler() {
    // Writes to a crash log even if logging isn't initialized yet
    std::panic::set_hook(Box::new(|panic_info| {
        let crash_msg = format!(
            "apiviz crashed!\n\
             Panic occurred at: {}\n\
             Details: {}\n\
             Backtrace:\n{:?}\n",
            panic_info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "unknown location".to_string()),
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic_info.payload().downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("unknown panic"),
            std::backtrace::Backtrace::force_capture()
        );

        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "", "apiviz") {
            let log_dir = proj_dirs.data_dir().join("logs");
            let _ = std::fs::create_dir_all(&log_dir);
            let crash_log_path = log_dir.join("crash.log");

            if let Ok(mut file) = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&crash_log_path)
            {
                use std::io::Write;
                let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                let _ = writeln!(file, "\n=== CRASH at {} ===\n{}", timestamp, crash_msg);
            }

            eprintln!("\n{}", crash_msg);
            eprintln!("Crash log written to: {:?}", crash_log_path);
        } else {
            eprintln!("\n{}", crash_msg);
        }
    }));
}

fn history_backend(settings: &WidgetSettings) -> Result<Arc<dyn HistoryBackend>> {
    let backend = match &settings.history_file {
        Some(path) => FileHistoryBackend::new(path),
        None => FileHistoryBackend::default_location()?,
    };
    Ok(Arc::new(backend))
}

fn list_history(settings: &WidgetSettings) -> Result<()> {
    let backend = history_backend(settings)?;
    let description = backend.describe();
    let store = HistoryStore::load(backend);

    if store.is_empty() {
        println!("No saved visualizations ({})", description);
        return Ok(());
    }
    for (index, entry) in store.entries().iter().enumerate() {
        println!(
            "{:>2}  {}  {}",
            index,
            entry
                .timestamp
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M"),
            entry.title(60)
        );
    }
    Ok(())
}

fn bridge_ready_document(artifact: &str, settings: &WidgetSettings) -> Result<String> {
    let artifact = sanitize_artifact(artifact);
    if artifact.is_empty() {
        bail!("Artifact is empty");
    }
    Ok(build_document(
        &artifact,
        &SandboxContextId::generate(),
        settings.bridge_timeout(),
    ))
}

fn render_file(path: &Path, settings: &WidgetSettings) -> Result<()> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    println!("{}", bridge_ready_document(&raw, settings)?);
    Ok(())
}

fn print_overview(path: &Path) -> Result<()> {
    let description =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let Some(overview) = ApiOverview::parse(&description) else {
        bail!("{:?} has no OpenAPI-style paths", path);
    };
    if let Some(title) = &overview.title {
        println!("{}", title);
    }
    for line in overview.to_display_lines() {
        println!("  {}", line);
    }
    Ok(())
}

fn read_api_description(api: Option<&PathBuf>) -> Result<String> {
    match api {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
        }
        None => Ok(r#"{"paths": {}}"#.to_string()),
    }
}

#[cfg(feature = "webview")]
fn show_entry(
    index: usize,
    base_url: Option<String>,
    api: Option<PathBuf>,
    theme: Option<Theme>,
    settings: &WidgetSettings,
) -> Result<()> {
    use apiviz::app::config::WidgetConfig;
    use apiviz::app::http_fetcher::HttpFetcher;
    use apiviz::app::webview::{run_webview, surface_event_loop, WebviewSurface};
    use apiviz::app::widget::completion_fn;
    use apiviz::VizWidget;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let event_loop = surface_event_loop();
    let surface = Arc::new(WebviewSurface::new(&event_loop));

    let mut fetcher = HttpFetcher::new()?;
    if let Some(base_url) = &base_url {
        fetcher = fetcher.with_base_url(base_url)?.same_origin_only();
    }

    let config = WidgetConfig::new(read_api_description(api.as_ref())?)
        .with_surface(surface)
        .with_completion(completion_fn(|_prompt| async {
            Err(anyhow::anyhow!("The viewer cannot generate new visualizations"))
        }))
        .with_fetcher(Arc::new(fetcher))
        .with_history_backend(history_backend(settings)?)
        .on_fault(|fault| tracing::warn!("Visualization fault: {}", fault));
    let mut config = settings.apply(config);
    if let Some(theme) = theme {
        config = config.with_theme(theme);
    }
    let widget = VizWidget::create(config)?;

    let Some(entry) = widget.history().get(index).cloned() else {
        bail!("No history entry {}", index);
    };
    if !widget.select_history_entry(index) {
        bail!("Failed to display history entry {}", index);
    }

    let handle = runtime.handle().clone();
    run_webview(event_loop, &format!("apiviz - {}", entry.title(60)), move |origin, raw| {
        let widget = widget.clone();
        handle.spawn(async move {
            widget.handle_raw_message(&origin, &raw).await;
        });
    })
}

#[cfg(not(feature = "webview"))]
fn show_entry(
    index: usize,
    _base_url: Option<String>,
    _api: Option<PathBuf>,
    _theme: Option<Theme>,
    settings: &WidgetSettings,
) -> Result<()> {
    let store = HistoryStore::load(history_backend(settings)?);
    let Some(entry) = store.get(index) else {
        bail!("No history entry {}", index);
    };
    eprintln!("Built without the webview feature; printing the document instead");
    println!("{}", bridge_ready_document(&entry.html, settings)?);
    Ok(())
}

fn main() -> Result<()> {
    // Set up panic handler BEFORE anything else to catch early crashes
    setup_panic_handler();
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{:#}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    tracing::info!("apiviz starting: {:?}", cli.command);

    let settings = WidgetSettings::load_or_default(cli.settings.as_deref());

    match cli.command {
        CliCommand::Help => print!("{}", USAGE),
        CliCommand::Version => println!(
            "apiviz {} ({})",
            env!("CARGO_PKG_VERSION"),
            env!("APIVIZ_GIT_COMMIT")
        ),
        CliCommand::History => list_history(&settings)?,
        CliCommand::Render(path) => render_file(&path, &settings)?,
        CliCommand::Overview(path) => print_overview(&path)?,
        CliCommand::Show {
            index,
            base_url,
            api,
            theme,
        } => show_entry(index, base_url, api, theme, &settings)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("apiviz")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_parse_show_with_options() {
        let cli = parse_args(&args(&["show", "2", "--base-url", "http://localhost:3000"])).unwrap();
        assert_eq!(
            cli.command,
            CliCommand::Show {
                index: 2,
                base_url: Some("http://localhost:3000".to_string()),
                api: None,
                theme: None,
            }
        );
    }

    #[test]
    fn test_parse_theme_flag() {
        let cli = parse_args(&args(&["show", "0", "--theme", "Dark"])).unwrap();
        assert!(matches!(
            cli.command,
            CliCommand::Show {
                theme: Some(Theme::Dark),
                ..
            }
        ));

        let error = parse_args(&args(&["show", "0", "--theme", "sepia"])).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Unknown theme 'sepia' (expected light, dark or auto)"
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&["show", "two"])).is_err());
        assert!(parse_args(&args(&["render"])).is_err());
        assert!(parse_args(&args(&["explode"])).is_err());
        assert_eq!(parse_args(&args(&[])).unwrap().command, CliCommand::Help);
    }

    #[test]
    fn test_bridge_ready_document() {
        let settings = WidgetSettings::default();
        let document = bridge_ready_document("```html\n<body><p>x</p></body>\n```", &settings).unwrap();
        assert!(document.starts_with("<meta http-equiv=\"Content-Security-Policy\""));
        assert!(document.contains("<body><script data-apiviz-bridge>"));
        assert!(bridge_ready_document("```\n```", &settings).is_err());
    }
}
