use crate::cli::{Cli, Command};
use crate::config::{self, AppConfig};
use crate::error::AppResult;
use crate::logger;
use crate::themes;
use engine::registry::StoreRegistry;
use engine::signal::{SignalSource, SystemSignals};
use engine::store::{ResolvedSelection, Selection, StoreOptions, ThemeStore};
use engine::ThemeConfig;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Loads configuration, installs the logger and executes the parsed command.
pub async fn run(cli: Cli) -> AppResult<()> {
    let mut app_config = config::load_config(cli.config.as_deref())?;
    cli.apply_overrides(&mut app_config);
    config::ensure_valid(&app_config)?;
    logger::setup_logger(app_config.logging())?;

    let theme_config = themes::load_theme_config(app_config.themes_file())?;
    let signals = Arc::new(SystemSignals::new());
    let registry = StoreRegistry::global();

    let result = execute(
        cli.command,
        &app_config,
        theme_config,
        registry,
        signals,
    )
    .await;
    registry.destroy_all();
    result
}

pub async fn execute(
    command: Command,
    app_config: &AppConfig,
    theme_config: ThemeConfig,
    registry: &StoreRegistry,
    signals: Arc<SystemSignals>,
) -> AppResult<()> {
    if command == Command::Options {
        print!("{}", render_options(&theme_config));
        return Ok(());
    }

    let store = open_store(app_config, theme_config, registry, signals.clone()).await?;
    match command {
        Command::Options => {}
        Command::Get { json } => {
            if json {
                println!("{}", render_json(&store)?);
            } else {
                print!("{}", render_selection(&store));
            }
        }
        Command::Set { assignments } => {
            print!("{}", set(&store, assignments).await?);
        }
        Command::Clear => {
            store.clear().await?;
            print!("{}", render_selection(&store));
        }
        Command::Watch => {
            watch(&store, &signals, app_config.refresh_interval()).await?;
        }
    }
    Ok(())
}

/// Creates the configured store in `registry` and restores its record.
pub async fn open_store(
    app_config: &AppConfig,
    theme_config: ThemeConfig,
    registry: &StoreRegistry,
    signals: Arc<dyn SignalSource>,
) -> AppResult<Arc<ThemeStore>> {
    let options = StoreOptions::new(theme_config)
        .with_key(app_config.store_key())
        .with_storage(app_config.storage_factory()?)
        .with_signals(signals)
        .with_lifecycle(app_config.lifecycle());

    let store = registry.create_store(options)?;
    store.restore().await;
    log::debug!(
        "Opened store '{}' with {:?} storage",
        store.key(),
        app_config.storage()
    );
    Ok(store)
}

/// Applies `assignments` and returns the rendered result.
pub async fn set(store: &ThemeStore, assignments: Vec<(String, String)>) -> AppResult<String> {
    let partial: Selection = assignments.into_iter().collect();
    store.set_selection(partial).await?;
    Ok(render_selection(store))
}

pub async fn watch(
    store: &ThemeStore,
    signals: &SystemSignals,
    refresh_interval: Duration,
) -> AppResult<()> {
    let handle = store.sync()?;
    let subscription = store.subscribe(|selection, resolved| {
        println!(
            "[{}] {}",
            chrono::Local::now().format("%H:%M:%S"),
            describe(selection, resolved)
        );
    });
    println!(
        "Watching '{}': {}",
        store.key(),
        describe(&store.selection(), &store.resolved_selection())
    );

    let mut ticker = tokio::time::interval(refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            interrupted = tokio::signal::ctrl_c() => {
                interrupted?;
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = signals.refresh() {
                    log::warn!("Failed to re-detect the color scheme: {e}");
                }
            }
        }
    }

    handle.cancel();
    subscription.unsubscribe();
    Ok(())
}

/// One line per dimension: key, label and options with the default marked.
pub fn render_options(theme_config: &ThemeConfig) -> String {
    let mut out = String::new();
    for summary in theme_config.dimensions_and_options() {
        let default = theme_config
            .dimension(&summary.key)
            .and_then(|dimension| dimension.default_option())
            .map(|option| option.key().to_string());
        let options: Vec<String> = summary
            .options
            .iter()
            .map(|(key, value)| {
                let marker = if Some(key) == default.as_ref() { "*" } else { "" };
                if key == value {
                    format!("{key}{marker}")
                } else {
                    format!("{key}{marker} ({value})")
                }
            })
            .collect();
        let _ = writeln!(
            out,
            "{} [{}]: {}",
            summary.key,
            summary.label,
            options.join(", ")
        );
    }
    out
}

/// One line per dimension with the resolved value when it differs.
pub fn render_selection(store: &ThemeStore) -> String {
    let selection = store.selection();
    let resolved = store.resolved_selection();
    let mut out = String::new();
    for (dimension, option) in selection.iter() {
        match resolved.get(dimension) {
            Some(value) if value != option => {
                let _ = writeln!(out, "{dimension} = {option} -> {value}");
            }
            _ => {
                let _ = writeln!(out, "{dimension} = {option}");
            }
        }
    }
    out
}

pub fn render_json(store: &ThemeStore) -> AppResult<String> {
    let document = serde_json::json!({
        "key": store.key(),
        "selection": store.selection(),
        "resolved": store.resolved_selection(),
    });
    serde_json::to_string_pretty(&document)
        .map_err(|e| crate::error::AppError::Io(format!("Failed to render JSON: {e}")))
}

fn describe(selection: &Selection, resolved: &ResolvedSelection) -> String {
    selection
        .iter()
        .map(|(dimension, option)| match resolved.get(dimension) {
            Some(value) if value != option => format!("{dimension}={option} ({value})"),
            _ => format!("{dimension}={option}"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
