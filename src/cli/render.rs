//! Plain-text dashboard rendering

use std::fmt::Write;

use crate::app_state::{AppState, Screen};
use crate::lead::{ChatMessage, Speaker};
use crate::report::{Amenity, FloodRiskLevel, PropertyReport, School};

const RULE: &str = "------------------------------------------------------------";

pub fn help() -> &'static str {
    "Commands:
  search <address>      Fetch an area report
  compare <address>     Fetch a second report for side-by-side view
  back                  Leave the comparison view
  deep                  Stream the deep-dive analysis
  listen                Read the summary aloud (again to stop)
  save <file.wav>       Save the last narration as a WAV file
  advisor               Start a live voice session about this property
  mute                  Toggle the live session microphone
  hangup                End the live session
  pro [message]         Talk to the inspection request assistant
  new                   Start a new search
  signin <email> <pw>   Sign in
  signup <email> <pw>   Create an account
  signout               Sign out
  help                  Show this list
  quit                  Exit"
}

/// Full-screen text for the current state
pub fn screen(state: &AppState) -> String {
    match &state.screen {
        Screen::Idle if !state.verified => {
            "Sign in with a verified email to unlock property insights.\n\
             Use `signin <email> <password>` or `signup <email> <password>`."
                .to_string()
        }
        Screen::Idle => "Enter a UK address or postcode: search <address>".to_string(),
        Screen::Loading { address, .. } => format!("Analysing {} ...", address),
        Screen::Report {
            report, comparison, ..
        } => {
            let mut out = dashboard(report);
            if let Some(pending) = comparison {
                let _ = write!(out, "\nFetching comparison for {} ...", pending.address);
            }
            out
        }
        Screen::Comparing {
            primary, secondary, ..
        } => comparison(primary, secondary),
        Screen::Error { message } => format!("Error: {}\nType `new` to start again.", message),
    }
}

pub fn dashboard(report: &PropertyReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "{}  [{}]", report.address, report.postcode);
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "{}\n", report.summary);

    let bb = &report.broadband;
    let _ = writeln!(out, "Broadband");
    let _ = writeln!(
        out,
        "  {} down / {} up, latency {}{}",
        bb.max_speed,
        bb.upload_speed,
        bb.latency,
        if bb.fiber_available { ", full fibre" } else { "" }
    );
    if !bb.providers.is_empty() {
        let _ = writeln!(out, "  Providers: {}", bb.providers.join(", "));
    }
    let _ = writeln!(out, "  {}", bb.description);

    let _ = writeln!(out, "\nSafety");
    let _ = writeln!(out, "  Crime: {} ({})", report.crime.level, report.crime.recent_stats);
    if !report.crime.common_types.is_empty() {
        let _ = writeln!(out, "  Common: {}", report.crime.common_types.join(", "));
    }
    let flood = report.flood_risk.level();
    let _ = writeln!(
        out,
        "  Flood risk: {}{}",
        flood,
        if flood.is_elevated() { " (!)" } else { "" }
    );
    let _ = writeln!(out, "  {}", report.flood_risk.details);

    schools(&mut out, &report.schools);
    amenities(&mut out, "Shops", &report.shops);
    amenities(&mut out, "Transport", &report.transport);
    amenities(&mut out, "Healthcare", &report.healthcare);
    amenities(&mut out, "Gyms", &report.gyms);

    if let Some(analysis) = &report.deep_analysis {
        let _ = writeln!(out, "\nDeep dive\n{}", analysis);
    }
    out
}

fn schools(out: &mut String, schools: &[School]) {
    if schools.is_empty() {
        return;
    }
    let _ = writeln!(out, "\nSchools");
    for s in schools {
        let _ = writeln!(
            out,
            "  {} ({}), Ofsted: {}, {}",
            s.name, s.kind, s.ofsted_rating, s.distance
        );
    }
}

fn amenities(out: &mut String, title: &str, items: &[Amenity]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{}", title);
    for a in items {
        let _ = writeln!(out, "  {} ({}), {}", a.name, a.kind, a.distance);
    }
}

/// Two reports side by side, one row per metric
pub fn comparison(primary: &PropertyReport, secondary: &PropertyReport) -> String {
    let rows: Vec<(&str, String, String)> = vec![
        ("Postcode", primary.postcode.clone(), secondary.postcode.clone()),
        (
            "Download",
            primary.broadband.max_speed.clone(),
            secondary.broadband.max_speed.clone(),
        ),
        (
            "Full fibre",
            yes_no(primary.broadband.fiber_available),
            yes_no(secondary.broadband.fiber_available),
        ),
        ("Crime", primary.crime.level.clone(), secondary.crime.level.clone()),
        (
            "Flood risk",
            flood_label(primary.flood_risk.level()),
            flood_label(secondary.flood_risk.level()),
        ),
        (
            "Schools",
            primary.schools.len().to_string(),
            secondary.schools.len().to_string(),
        ),
        (
            "Transport",
            primary.transport.len().to_string(),
            secondary.transport.len().to_string(),
        ),
    ];

    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "{:<12}{:<24}{}", "", truncate(&primary.address, 22), secondary.address);
    let _ = writeln!(out, "{}", RULE);
    for (label, a, b) in rows {
        let _ = writeln!(out, "{:<12}{:<24}{}", label, a, b);
    }
    let _ = write!(out, "Type `back` to return to {}.", primary.address);
    out
}

pub fn chat_message(message: &ChatMessage) -> String {
    match message.speaker {
        Speaker::User => format!("you> {}", message.text),
        Speaker::Agent => format!("assistant> {}", message.text),
    }
}

fn flood_label(level: FloodRiskLevel) -> String {
    level.to_string()
}

fn yes_no(value: bool) -> String {
    if value { "Yes" } else { "No" }.to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
