//! `safedrive` - CLI for the SafeDrive telemetry API
//!
//! This binary provides the command-line interface for checking the API,
//! watching live readings, browsing the local history and exporting
//! evidence packages.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::sync::mpsc;

use safedrive::cli::{
    AccidentsCommand, Cli, Command, ConfigCommand, DbCommand, ExportCommand, HistoryCommand,
    LatestCommand, OutputFormat, WatchCommand,
};
use safedrive::poller::{PollData, PollUpdate};
use safedrive::{
    assess, init_logging, AccidentDetector, AccidentEvent, ApiClient, CancelToken, Config,
    DangerLevel, EvidencePackage, GpsFix, Poller, PollerConfig, PollerManager, SensorReading,
    Storage, Summary,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Config commands must work even when the configuration is broken
    if let Command::Config(config_cmd) = cli.command {
        return handle_config(cli.config, config_cmd);
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Health(cmd) => handle_health(&config, cmd.json).await,
        Command::Latest(cmd) => handle_latest(&config, &cmd).await,
        Command::Watch(cmd) => handle_watch(&config, &cmd).await,
        Command::Accidents(cmd) => handle_accidents(&config, &cmd).await,
        Command::History(cmd) => handle_history(&config, &cmd).await,
        Command::Stats(cmd) => handle_stats(&config, cmd.json).await,
        Command::Export(cmd) => handle_export(&config, &cmd).await,
        Command::Db(cmd) => handle_db(&config, cmd),
        Command::Config(_) => Ok(()),
    }
}

fn api_client(config: &Config) -> anyhow::Result<ApiClient> {
    ApiClient::new(&config.api.base_url, config.retry_policy()).context("failed to create API client")
}

fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

/// A token cancelled on Ctrl-C.
fn interrupt_token() -> CancelToken {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn reading_line(reading: &SensorReading, level: DangerLevel) -> String {
    let location = reading
        .gps_fix()
        .map_or_else(|| "no fix".to_string(), |fix| format!("{:.5},{:.5}", fix.lat, fix.lng));
    format!(
        "{}  alcohol {:>5.3}  dist {:>6.1}cm  vib {:>4.2}g  impact {:>4.2}g  belt {:<3}  {:<14}  {}",
        reading.timestamp.format("%Y-%m-%d %H:%M:%S"),
        reading.alcohol,
        reading.distance,
        reading.vibration,
        reading.impact,
        if reading.seatbelt { "on" } else { "OFF" },
        location,
        level,
    )
}

fn accident_line(event: &AccidentEvent) -> String {
    let location = location_cell(event.location());
    let severity = event
        .severity
        .map_or_else(|| "?".to_string(), |s| s.to_string());
    format!(
        "{:<20}  {}  {:<6}  impact {:>4.2}g  {:<20}  {}",
        event.id,
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        severity,
        event.impact,
        location,
        event.summary.as_deref().unwrap_or(""),
    )
}

fn location_cell(fix: Option<GpsFix>) -> String {
    fix.map_or_else(|| "-".to_string(), |fix| format!("{:.5},{:.5}", fix.lat, fix.lng))
}

fn print_header(columns: &str) {
    println!("{columns}");
    println!("{}", "-".repeat(columns.len()));
}

fn reading_header() -> String {
    format!(
        "{:<19}  {:>7}  {:>8}  {:>6}  {:>6}  {:<4}  {:<21}  {}",
        "TIME", "ALCOHOL", "DIST(cm)", "VIB(g)", "IMPACT", "BELT", "LOCATION", "LEVEL"
    )
}

fn reading_row(reading: &SensorReading, level: DangerLevel) -> String {
    format!(
        "{:<19}  {:>7.3}  {:>8.1}  {:>6.2}  {:>6.2}  {:<4}  {:<21}  {}",
        reading.timestamp.format("%Y-%m-%d %H:%M:%S"),
        reading.alcohol,
        reading.distance,
        reading.vibration,
        reading.impact,
        if reading.seatbelt { "on" } else { "OFF" },
        location_cell(reading.gps_fix()),
        level,
    )
}

fn accident_header() -> String {
    format!(
        "{:<20}  {:<19}  {:<8}  {:>6}  {:<21}  {}",
        "ID", "TIME", "SEVERITY", "IMPACT", "LOCATION", "SUMMARY"
    )
}

fn accident_row(event: &AccidentEvent) -> String {
    format!(
        "{:<20}  {:<19}  {:<8}  {:>6.2}  {:<21}  {}",
        event.id,
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        event.severity.map_or_else(|| "?".to_string(), |s| s.to_string()),
        event.impact,
        location_cell(event.location()),
        event.summary.as_deref().unwrap_or(""),
    )
}

fn track_header() -> String {
    format!("{:>11}  {:>11}", "LAT", "LNG")
}

fn track_row(fix: &GpsFix) -> String {
    format!("{:>11.6}  {:>11.6}", fix.lat, fix.lng)
}

/// Filters polled accident lists down to events not reported before.
///
/// With storage the database decides, so events seen in earlier sessions
/// stay quiet; without it the ids seen in this session do.
#[derive(Debug)]
struct AccidentFeed<'a> {
    storage: Option<&'a Storage>,
    seen: HashSet<String>,
}

impl<'a> AccidentFeed<'a> {
    fn new(storage: Option<&'a Storage>) -> Self {
        Self {
            storage,
            seen: HashSet::new(),
        }
    }

    fn fresh<'e>(&mut self, events: &'e [AccidentEvent]) -> anyhow::Result<Vec<&'e AccidentEvent>> {
        let mut fresh = Vec::new();
        for event in events {
            let is_new = match self.storage {
                Some(storage) => storage.insert_accident(event)?,
                None => self.seen.insert(event.id.clone()),
            };
            if is_new {
                fresh.push(event);
            }
        }
        Ok(fresh)
    }
}

async fn handle_health(config: &Config, json: bool) -> anyhow::Result<()> {
    let client = api_client(config)?;
    let result = client.health(&interrupt_token()).await;

    if json {
        let status = serde_json::json!({
            "base_url": client.base_url(),
            "healthy": result.is_ok(),
            "server": result.as_ref().ok(),
            "error": result.as_ref().err().map(ToString::to_string),
        });
        print_json(&status)?;
    } else {
        match &result {
            Ok(info) => {
                println!("API:     {}", client.base_url());
                println!("Status:  {}", info.status.as_deref().unwrap_or("ok"));
                if let Some(time) = &info.time {
                    println!("Server:  {time}");
                }
            }
            Err(e) => {
                println!("API:     {}", client.base_url());
                println!("Status:  unavailable ({e})");
            }
        }
    }

    result.map(|_| ()).context("API health check failed")
}

async fn handle_latest(config: &Config, cmd: &LatestCommand) -> anyhow::Result<()> {
    let client = api_client(config)?;
    let reading = client
        .latest_sensor(&interrupt_token())
        .await
        .context("failed to fetch the latest reading")?;
    let assessment = assess(&reading, &config.thresholds());

    if !cmd.no_store {
        open_storage(config)?.insert_reading(&reading)?;
    }

    if cmd.json {
        print_json(&serde_json::json!({
            "reading": reading,
            "assessment": assessment,
        }))?;
    } else {
        println!("{}", reading_line(&reading, assessment.level));
        for hazard in &assessment.hazards {
            println!("  ! {hazard}");
        }
        if let Some(text) = &reading.lcd_display {
            println!("  display: {text}");
        }
        if let Some(bpm) = reading.heart_rate {
            println!("  heart rate: {bpm} bpm");
        }
    }
    Ok(())
}

async fn handle_watch(config: &Config, cmd: &WatchCommand) -> anyhow::Result<()> {
    let client = api_client(config)?;
    let storage = if cmd.no_store {
        None
    } else {
        Some(open_storage(config)?)
    };
    let cancel = interrupt_token();
    let (tx, mut rx) = mpsc::channel(32);

    let sensor_interval = cmd
        .interval_ms
        .map_or_else(|| config.sensor_poll_interval(), Duration::from_millis);
    let mut configs = vec![PollerConfig::latest_sensor()
        .with_interval(sensor_interval)
        .with_policy(config.poll_policy())];
    if cmd.accidents {
        configs.push(
            PollerConfig::accidents()
                .with_interval(config.accident_poll_interval())
                .with_policy(config.poll_policy()),
        );
    }

    let mut manager = PollerManager::new();
    let mut tasks = Vec::new();
    for poller_config in configs {
        let poller = Poller::new(&client, poller_config, &cancel);
        manager.add(poller.handle());
        tasks.push(tokio::spawn(poller.run(tx.clone())));
    }
    drop(tx);

    eprintln!(
        "Watching {} (Ctrl-C to stop)...",
        client.base_url()
    );

    let mut detector = AccidentDetector::new(config.thresholds());
    let mut feed = AccidentFeed::new(storage.as_ref());
    let mut seen = 0usize;
    let mut connected = true;

    while let Some(update) = rx.recv().await {
        match update {
            PollUpdate::Data { data, .. } => {
                if !connected {
                    eprintln!("Connection restored.");
                    connected = true;
                }
                match data {
                    PollData::Sensor(reading) => {
                        let assessment = assess(&reading, detector.thresholds());
                        println!("{}", reading_line(&reading, assessment.level));

                        if let Some(storage) = &storage {
                            storage.insert_reading(&reading)?;
                        }
                        if let Some(event) = detector.observe(&reading) {
                            println!("ACCIDENT  {}", accident_line(&event));
                            if let Some(storage) = &storage {
                                storage.insert_accident(&event)?;
                            }
                        }

                        seen += 1;
                        if cmd.count.is_some_and(|n| seen >= n) {
                            manager.stop_all();
                        }
                    }
                    PollData::Accidents(events) => {
                        for event in feed.fresh(&events)? {
                            println!("ACCIDENT  {}", accident_line(event));
                        }
                    }
                    PollData::Readings(_) | PollData::Stats(_) | PollData::Health(_) => {}
                }
            }
            PollUpdate::Failed { endpoint, error } => {
                if connected {
                    eprintln!("Connection lost ({endpoint}): {error}");
                    connected = false;
                }
            }
        }
    }

    for task in tasks {
        task.await.context("poller task failed")?;
    }
    for (endpoint, status) in manager.statuses() {
        eprintln!(
            "{endpoint}: {} ok, {} failed",
            status.successes, status.failures
        );
    }
    Ok(())
}

async fn handle_accidents(config: &Config, cmd: &AccidentsCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let events = if cmd.local {
        storage.recent_accidents(cmd.limit)?
    } else {
        let client = api_client(config)?;
        let mut events = client
            .accidents(&interrupt_token())
            .await
            .context("failed to fetch accidents")?;
        for event in &events {
            storage.insert_accident(event)?;
        }
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(cmd.limit);
        events
    };

    match cmd.format {
        OutputFormat::Json => print_json(&events)?,
        _ if events.is_empty() => println!("No accidents recorded."),
        OutputFormat::Plain => {
            for event in &events {
                println!("{}", accident_line(event));
            }
        }
        OutputFormat::Table => {
            print_header(&accident_header());
            for event in &events {
                println!("{}", accident_row(event));
            }
        }
    }
    Ok(())
}

async fn handle_history(config: &Config, cmd: &HistoryCommand) -> anyhow::Result<()> {
    let storage = if cmd.remote {
        None
    } else {
        Some(open_storage(config)?)
    };

    let readings = match &storage {
        Some(storage) => storage.recent_readings(cmd.limit)?,
        None => {
            let mut readings = api_client(config)?
                .sensor_history(&interrupt_token())
                .await
                .context("failed to fetch sensor history")?;
            readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            readings.truncate(cmd.limit);
            readings
        }
    };

    if cmd.track {
        let track = match &storage {
            Some(storage) => storage.track(cmd.limit)?,
            None => {
                let mut track: Vec<_> =
                    readings.iter().rev().filter_map(SensorReading::gps_fix).collect();
                track.dedup();
                track
            }
        };
        match cmd.format {
            OutputFormat::Json => print_json(&track)?,
            OutputFormat::Plain => {
                for fix in &track {
                    println!("{:.6},{:.6}", fix.lat, fix.lng);
                }
            }
            OutputFormat::Table => {
                print_header(&track_header());
                for fix in &track {
                    println!("{}", track_row(fix));
                }
            }
        }
        return Ok(());
    }

    let thresholds = config.thresholds();
    if cmd.summary {
        let summary = Summary::from_readings(&readings, &thresholds);
        match cmd.format {
            OutputFormat::Json => print_json(&summary)?,
            format => {
                if format == OutputFormat::Table {
                    print_header("Reading summary");
                }
                println!("Readings:        {}", summary.count);
                println!("Alcohol:         avg {:.3}  max {:.3}", summary.avg_alcohol, summary.max_alcohol);
                println!("Vibration:       avg {:.2}g  max {:.2}g", summary.avg_vibration, summary.max_vibration);
                println!("Impact:          avg {:.2}g  max {:.2}g", summary.avg_impact, summary.max_impact);
                if let Some(d) = summary.min_distance {
                    println!("Closest:         {d:.1}cm");
                }
                println!("Seatbelt:        {:.0}%", summary.seatbelt_ratio * 100.0);
                println!("With hazards:    {}", summary.hazardous);
            }
        }
        return Ok(());
    }

    match cmd.format {
        OutputFormat::Json => print_json(&readings)?,
        _ if readings.is_empty() => {
            println!("No readings recorded. Run `safedrive watch` to collect some.");
        }
        OutputFormat::Plain => {
            for reading in &readings {
                println!("{}", reading_line(reading, assess(reading, &thresholds).level));
            }
        }
        OutputFormat::Table => {
            print_header(&reading_header());
            for reading in &readings {
                println!("{}", reading_row(reading, assess(reading, &thresholds).level));
            }
        }
    }
    Ok(())
}

async fn handle_stats(config: &Config, json: bool) -> anyhow::Result<()> {
    let client = api_client(config)?;
    let stats = client
        .stats(&interrupt_token())
        .await
        .context("failed to fetch statistics")?;

    if json {
        print_json(&stats)?;
    } else {
        println!("API statistics");
        println!("--------------");
        if let Some(n) = stats.total_readings {
            println!("Total readings:   {n}");
        }
        if let Some(n) = stats.total_accidents {
            println!("Total accidents:  {n}");
        }
        if let Some(updated) = &stats.last_updated {
            println!("Last updated:     {updated}");
        }
        for (key, value) in &stats.extra {
            println!("{key}: {value}");
        }
    }
    Ok(())
}

async fn handle_export(config: &Config, cmd: &ExportCommand) -> anyhow::Result<()> {
    let client = api_client(config)?;
    let demo_fallback = config.api.demo_fallback && !cmd.no_demo;
    let snapshot = client
        .load_dashboard(&interrupt_token(), demo_fallback)
        .await
        .context("failed to load data for export")?;

    for failure in &snapshot.failures {
        eprintln!("warning: {} failed: {}", failure.endpoint, failure.message);
    }
    let source = snapshot.source;

    let dir = cmd.dir.clone().unwrap_or_else(|| config.report_dir());
    let package = EvidencePackage::from_snapshot(snapshot, Utc::now());
    let path = package.write_to(&dir)?;

    println!(
        "Exported {} readings and {} accidents ({source}) to {}",
        package.sensor_data.len(),
        package.accident_data.len(),
        path.display()
    );
    Ok(())
}

fn handle_db(config: &Config, cmd: DbCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    match cmd {
        DbCommand::Status { json } => {
            let stats = storage.stats()?;
            if json {
                print_json(&serde_json::json!({
                    "database_path": storage.path(),
                    "total_readings": stats.total_readings,
                    "total_accidents": stats.total_accidents,
                    "oldest_reading": stats.oldest_reading,
                    "newest_reading": stats.newest_reading,
                    "db_size_bytes": stats.db_size_bytes,
                }))?;
            } else {
                println!("Database:      {}", storage.path().display());
                println!("Readings:      {}", stats.total_readings);
                println!("Accidents:     {}", stats.total_accidents);
                if let (Some(oldest), Some(newest)) = (stats.oldest_reading, stats.newest_reading) {
                    println!("Range:         {oldest} .. {newest}");
                }
                println!("Size:          {} bytes", stats.db_size_bytes);
            }
        }
        DbCommand::Prune { keep, max_age_days } => {
            // 0 means unlimited, as in the config file.
            let max_age = match max_age_days {
                Some(0) => None,
                Some(days) => Some(Duration::from_secs(u64::from(days) * 24 * 60 * 60)),
                None => config.max_age(),
            };
            let max_readings = match keep {
                Some(0) => None,
                Some(n) => Some(n),
                None => config.max_readings(),
            };
            let (by_age, by_count) = storage.apply_retention(max_age, max_readings)?;
            println!("Pruned {} readings ({by_age} by age, {by_count} by count).", by_age + by_count);
        }
    }
    Ok(())
}

fn handle_config(path: Option<std::path::PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(path).context("failed to load configuration")?;
            if json {
                print_json(&config)?;
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[API]");
                println!("  Base URL:           {}", config.api.base_url);
                println!("  Timeout (ms):       {}", config.api.timeout_ms);
                println!("  Retries:            {}", config.api.retries);
                println!("  Sensor poll (ms):   {}", config.api.sensor_poll_interval_ms);
                println!("  Accident poll (ms): {}", config.api.accident_poll_interval_ms);
                println!("  Demo fallback:      {}", config.api.demo_fallback);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Max readings:       {}", config.storage.max_readings);
                println!("  Max age (days):     {}", config.storage.max_age_days);
                println!();
                println!("[Detection]");
                println!("  Alcohol limit:      {}", config.detection.alcohol_limit);
                println!("  Min distance (cm):  {}", config.detection.min_distance);
                println!("  Max vibration (g):  {}", config.detection.max_vibration);
                println!("  Max impact (g):     {}", config.detection.max_impact);
                println!(
                    "  Accident impact:    {} / {} g",
                    config.detection.impact_low, config.detection.impact_high
                );
                println!("  Cooldown (s):       {}", config.detection.accident_cooldown_secs);
                println!();
                println!("[Report]");
                println!("  Output dir:         {}", config.report_dir().display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.or(path).unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => {
                    println!("Configuration error: {e}");
                    anyhow::bail!("configuration is invalid");
                }
            }
        }
    }
    Ok(())
}
