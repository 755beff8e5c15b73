//!
//! src/main.rs  Andrew Belles  Oct 19, 2026
//!
//! Entry point. Wires configuration, logging, the gemini client and the
//! controller together, then serves a line oriented console in place of
//! the browser surface
//!

mod config;
mod errors;
mod logging;

mod controller;
mod fetch;
mod search;
mod simulator;
mod sink;
mod state;
mod types;

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::controller::{Controller, ExportReport};
use crate::errors::{SearchError, SonicError};
use crate::search::MetadataBackend;
use crate::sink::ArtifactSink;
use crate::types::Tier;

const INITIAL_QUERY: &str = "Top Hits 2024";

const HELP: &str = "\
commands:
  <text> | search <text>   search for songs
  tier mp3 | tier flac     select export quality
  export <n>               export result n (Ctrl-C dismisses)
  art <n>                  artwork link for result n
  recent                   recent exports
  sources                  sources cited by the last search
  help                     this text
  quit                     leave";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Search(String),
    Tier(Tier),
    Export(usize),
    Art(usize),
    Recent,
    Sources,
    Help,
    Quit,
    Nothing,
}

impl Command {
    fn parse(line: &str) -> Result<Self, SonicError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Command::Nothing);
        }
        let (head, rest) = line.split_once(char::is_whitespace)
            .map(|(h, r)| (h, r.trim()))
            .unwrap_or((line, ""));

        // results are numbered from 1 on screen
        let position = |raw: &str| -> Result<usize, SonicError> {
            match raw.parse::<usize>() {
                Ok(n) if n >= 1 => Ok(n - 1),
                _ => Err(SonicError::Parse(format!("expected a result number, got {raw:?}"))),
            }
        };

        match head.to_ascii_lowercase().as_str() {
            "search" | "s" => Ok(Command::Search(rest.to_string())),
            "tier" | "quality" => Ok(Command::Tier(rest.parse()?)),
            "export" | "download" | "e" => Ok(Command::Export(position(rest)?)),
            "art" => Ok(Command::Art(position(rest)?)),
            "recent" | "history" => Ok(Command::Recent),
            "sources" => Ok(Command::Sources),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            _ => Ok(Command::Search(line.to_string())),
        }
    }
}

fn prompt() {
    print!("sonic> ");
    let _ = std::io::stdout().flush();
}

fn print_results<B: MetadataBackend, S: ArtifactSink>(ctl: &Controller<B, S>) {
    let state = ctl.state();
    if state.is_loading() {
        println!("Fetching results...");
        return;
    }
    match state.last_failure() {
        Some(SearchError::EmptyQuery) | None => {}
        Some(failure) => {
            println!("search failed: {failure}");
            return;
        }
    }
    if state.result_count() == 0 {
        println!("No music found. Try a different artist or song name.");
        return;
    }

    println!("{} songs found for \"{}\" [{}]", state.result_count(), state.query(), state.tier().label());
    for (i, track) in state.displayed().iter().enumerate() {
        let r = &track.record;
        let spec = r.audio_spec().map(|s| format!("  {s}")).unwrap_or_default();
        println!(
            "{:>2}. {} - {}  ({}, {})  {} | {}  [{}]{spec}",
            i + 1, r.artist, r.title, r.album, r.year, r.genre, r.duration, track.tier
        );
    }
}

fn print_recent<B: MetadataBackend, S: ArtifactSink>(ctl: &Controller<B, S>) {
    let mut any = false;
    for track in ctl.state().recent() {
        any = true;
        println!("  {} - {} [{}]", track.record.artist, track.record.title, track.tier);
    }
    if !any {
        println!("no exports yet");
    }
}

fn print_sources<B: MetadataBackend, S: ArtifactSink>(ctl: &Controller<B, S>) {
    let sources = ctl.state().sources();
    if sources.is_empty() {
        println!("no sources cited");
    }
    for s in sources {
        println!("  {} <{}>", s.title, s.uri);
    }
}

async fn run_search<B: MetadataBackend, S: ArtifactSink>(ctl: &mut Controller<B, S>, query: &str) {
    println!("Fetching results...");
    match ctl.search(query).await {
        Err(SearchError::EmptyQuery) => println!("nothing to search for"),
        _ => print_results(ctl),
    }
}

async fn run_export<B: MetadataBackend, S: ArtifactSink>(ctl: &mut Controller<B, S>, index: usize) {
    let watch = match ctl.begin_export(index) {
        Ok(w) => w,
        Err(e) => {
            println!("cannot export: {e}");
            return;
        }
    };
    let tier = ctl.state().active().map(|a| a.target.tier).unwrap_or_default();
    println!("export {} started", watch.session_id);

    let mut progress = watch.progress.clone();
    let show = async move {
        let mut last_stage = None;
        while progress.changed().await.is_ok() {
            let p = *progress.borrow_and_update();
            if last_stage != Some(p.stage) {
                match p.stage {
                    simulator::Stage::Encoding => println!("\n  > Converting to {tier} (FFmpeg)"),
                    stage => println!("\n  > {}", stage.label()),
                }
                last_stage = Some(p.stage);
            }
            let filled = usize::from(p.percent) / 5;
            print!("\r  [{:<20}] {:>3}%", "#".repeat(filled), p.percent);
            let _ = std::io::stdout().flush();
            if p.is_complete() {
                break;
            }
        }
        println!();
    };

    // Ctrl-C while the bar runs dismisses the export
    let interrupted = tokio::select! {
        _ = show => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        match ctl.dismiss_export() {
            Ok(target) => println!(
                "\nexport of {} - {} dismissed", target.record.artist, target.record.title
            ),
            Err(e) => println!("\n{e}"),
        }
        return;
    }

    match ctl.finish_export().await {
        Ok(ExportReport::Saved { path, .. }) => println!("Download ready: {}", path.display()),
        Ok(ExportReport::Cancelled { percent, .. }) => println!("export dismissed at {percent}%"),
        Err(e) => println!("export failed: {e}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), SonicError> {
    let cfgs = config::load_config()?;
    let _guard = logging::init_logging(&cfgs.logging)?;

    tracing::info!(
        service="sonic-fetch",
        version=%env!("CARGO_PKG_VERSION"),
        "starting"
    );
    tracing::debug!(config = ?cfgs, "configuration");

    let gemini  = fetch::GeminiClient::new(&cfgs.http, &cfgs.gemini)?;
    let service = search::MetadataQueryService::new(
        gemini,
        cfgs.gemini.result_target,
        cfgs.gemini.grounding
    );
    let schedule = simulator::Schedule::for_pipeline(cfgs.export.pipeline)?;
    tracing::debug!(
        pipeline = ?cfgs.export.pipeline,
        duration_ms = schedule.total_duration().as_millis() as u64,
        "schedule"
    );
    let disk     = sink::DiskSink::new(&cfgs.export.dir);
    let mut ctl  = Controller::new(service, schedule, disk);

    run_search(&mut ctl, INITIAL_QUERY).await;
    println!("type `help` for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let command = match Command::parse(&line) {
            Ok(c) => c,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match command {
            Command::Nothing => {}
            Command::Search(q) => run_search(&mut ctl, &q).await,
            Command::Tier(t) => {
                ctl.set_tier(t);
                println!("quality: {}", t.label());
            }
            Command::Export(i) => run_export(&mut ctl, i).await,
            Command::Art(i) => match ctl.artwork_link(i) {
                Ok(url) => println!("{url}"),
                Err(e) => println!("{e}"),
            },
            Command::Recent => print_recent(&ctl),
            Command::Sources => print_sources(&ctl),
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }

    tracing::info!("exit");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse() -> Result<(), SonicError> {
        assert_eq!(Command::parse("   ")?, Command::Nothing);
        assert_eq!(Command::parse("search  daft punk ")?, Command::Search("daft punk".into()));
        assert_eq!(Command::parse("Daft Punk")?, Command::Search("Daft Punk".into()));
        assert_eq!(Command::parse("tier flac")?, Command::Tier(Tier::Flac));
        assert_eq!(Command::parse("export 1")?, Command::Export(0));
        assert_eq!(Command::parse("art 3")?, Command::Art(2));
        assert_eq!(Command::parse("recent")?, Command::Recent);
        assert_eq!(Command::parse("QUIT")?, Command::Quit);
        Ok(())
    }

    #[test]
    fn bad_positions_and_tiers_are_rejected() {
        assert!(Command::parse("export 0").is_err());
        assert!(Command::parse("export two").is_err());
        assert!(Command::parse("tier ogg").is_err());
    }
}
