//! Plain-text output for the terminal, or pretty JSON with `--json`.

use std::collections::HashMap;

use anyhow::Result;
use aves_catalogue::TaxonListing;
use aves_core::{
  progress::{IngestPhase, IngestProgress, IngestReport},
  sighting::{Sighting, SyncState, SyncSummary},
  store::DatasetStamp,
  taxon::{Language, Taxon},
};
use aves_sync::{SyncOutcome, SyncReport};
use serde::Serialize;

pub fn json(value: &impl Serialize) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// One line per progress event, written to stderr so stdout stays clean.
pub fn progress(p: &IngestProgress) {
  let pct = if p.total == 0 {
    0
  } else {
    p.loaded * 100 / p.total
  };
  match &p.message {
    Some(message) => eprintln!("{:<9} {:>3}%  {message}", phase_label(p.phase), pct),
    None => eprintln!(
      "{:<9} {:>3}%  {}/{}",
      phase_label(p.phase),
      pct,
      p.loaded,
      p.total
    ),
  }
}

pub fn ingest_report(r: &IngestReport) {
  if r.reused {
    println!("reference data {} already loaded ({} taxa)", short(&r.revision), r.loaded);
    return;
  }
  println!(
    "loaded {} taxa from revision {} in {} ms",
    r.loaded,
    short(&r.revision),
    r.elapsed_ms
  );
  if r.skipped > 0 {
    println!("skipped {} malformed rows", r.skipped);
  }
  if r.resumed_from > 0 {
    println!("resumed after {} rows committed by an earlier run", r.resumed_from);
  }
}

pub fn listing(rows: &[TaxonListing], total: u64, page: i64, size: i64) {
  if rows.is_empty() {
    println!("no taxa match");
    return;
  }
  let code_w = rows.iter().map(|r| r.taxon.species_code.len()).max().unwrap_or(0);
  let name_w = rows.iter().map(|r| r.display_name.chars().count()).max().unwrap_or(0);
  for row in rows {
    println!(
      "{} {:<code_w$}  {:<name_w$}  {}",
      if row.logged { '*' } else { ' ' },
      row.taxon.species_code,
      row.display_name,
      row.taxon.scientific_name,
    );
  }
  let pages = total.div_ceil(size.max(1) as u64).max(1);
  println!("page {page} of {pages}, {total} taxa (* logged)");
}

pub fn taxon(t: &Taxon, language: Language) {
  println!("{}  {}", t.display_name(language), t.scientific_name);
  println!("  code      {}", t.species_code);
  println!("  category  {}", t.category);
  if let Some(order) = &t.order {
    println!("  order     {order}");
  }
  if let Some(family) = &t.family {
    println!("  family    {family}");
  }
  if let Some(range) = &t.range {
    println!("  range     {range}");
  }
  if t.extinct {
    match t.extinct_year {
      Some(year) => println!("  extinct   since {year}"),
      None => println!("  extinct"),
    }
  }
  println!("  names     en: {}", t.english_name);
  for language in Language::LOCALIZED {
    if let Some(name) = t.localized.get(language) {
      println!("            {language}: {name}");
    }
  }
}

pub fn names(requested: &[String], resolved: &HashMap<String, Option<String>>) {
  for name in requested {
    match resolved.get(name.trim()) {
      Some(Some(common)) => println!("{name}: {common}"),
      Some(None) => println!("{name}: (no name)"),
      None => println!("{name}: (unresolved)"),
    }
  }
}

pub fn sighting(s: &Sighting) {
  let state = match s.sync_state {
    SyncState::Unsynced => "unsynced",
    SyncState::Synced => "synced",
    SyncState::SyncFailed => "FAILED",
  };
  println!(
    "{}  {}  {:<8} {:<8} {}",
    s.sighting_id,
    s.body.observed_at.format("%Y-%m-%d %H:%M"),
    s.body.kind,
    state,
    s.body.species_guess,
  );
  if let Some(error) = &s.sync_error {
    println!("    last push: {error}");
  }
}

pub fn sync_report(r: &SyncReport) {
  match &r.outcome {
    SyncOutcome::Completed => println!("sync complete"),
    SyncOutcome::Partial => println!("sync finished with failures"),
    SyncOutcome::Offline => println!("hub unreachable; nothing sent"),
    SyncOutcome::Coalesced => println!("a sync is already running"),
    SyncOutcome::Failed { reason } => println!("sync failed: {reason}"),
  }
  if r.pushed + r.deleted + r.pulled + r.updated > 0 {
    println!(
      "  pushed {}, deleted {}, pulled {}, updated {}",
      r.pushed, r.deleted, r.pulled, r.updated
    );
  }
  for failure in &r.push_failures {
    let tag = if failure.permanent { "rejected" } else { "failed" };
    println!("  {tag} {}: {}", failure.sighting_id, failure.reason);
  }
  if let Some(error) = &r.pull_error {
    println!("  pull: {error}");
  }
  println!("{}", r.summary());
}

pub fn status(stamp: Option<&DatasetStamp>, summary: &SyncSummary, hub: Option<&str>) {
  match stamp {
    Some(s) if s.complete => {
      println!("reference  {} taxa, revision {}", s.loaded, short(&s.revision))
    }
    Some(s) => println!(
      "reference  incomplete: {}/{} taxa of revision {}",
      s.loaded,
      s.total,
      short(&s.revision)
    ),
    None => println!("reference  empty"),
  }
  println!(
    "sightings  {} synced, {} unsynced, {} failed, {} deletions pending",
    summary.synced, summary.unsynced, summary.sync_failed, summary.pending_deletions
  );
  println!("hub        {}", hub.unwrap_or("not configured"));
}

fn short(revision: &str) -> &str { revision.get(..12).unwrap_or(revision) }

fn phase_label(phase: IngestPhase) -> &'static str {
  match phase {
    IngestPhase::Parsing => "parsing",
    IngestPhase::Inserting => "inserting",
    IngestPhase::Indexing => "indexing",
    IngestPhase::Complete => "complete",
  }
}
