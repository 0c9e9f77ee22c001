//! Screen flow for the NestCheck front-end
//!
//! Single-writer pattern: every transition goes through [`reduce`], which
//! returns the next state plus the effects for the command loop to run.
//! Request ids tie fetch completions and deep-dive chunks to the request
//! that started them, so a late answer for an abandoned search is dropped.

use uuid::Uuid;

use crate::report::PropertyReport;

/// Prefix of the notice shown when a comparison fetch fails
pub const COMPARISON_FAILED_PREFIX: &str = "Could not fetch comparison address: ";

pub const DEEP_DIVE_DONE_MESSAGE: &str =
    "The deep dive for this property has already been generated.";
pub const DEEP_DIVE_BUSY_MESSAGE: &str = "The deep dive is still streaming.";

/// A comparison fetch still in flight
#[derive(Debug, Clone, PartialEq)]
pub struct PendingComparison {
    pub request_id: Uuid,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Screen {
    #[default]
    Idle,
    Loading {
        request_id: Uuid,
        address: String,
    },
    Report {
        report: PropertyReport,
        comparison: Option<PendingComparison>,
        /// Id of the deep-dive stream feeding `report`
        deep_dive: Option<Uuid>,
    },
    Comparing {
        primary: PropertyReport,
        secondary: PropertyReport,
        comparison: Option<PendingComparison>,
        deep_dive: Option<Uuid>,
    },
    Error {
        message: String,
    },
}

impl Screen {
    pub fn name(&self) -> &'static str {
        match self {
            Screen::Idle => "idle",
            Screen::Loading { .. } => "loading",
            Screen::Report { .. } => "report",
            Screen::Comparing { .. } => "comparing",
            Screen::Error { .. } => "error",
        }
    }

    /// The report the dashboard is built around, if one is showing
    pub fn primary_report(&self) -> Option<&PropertyReport> {
        match self {
            Screen::Report { report, .. } => Some(report),
            Screen::Comparing { primary, .. } => Some(primary),
            _ => None,
        }
    }

    fn pending_comparison(&self) -> Option<&PendingComparison> {
        match self {
            Screen::Report { comparison, .. } | Screen::Comparing { comparison, .. } => {
                comparison.as_ref()
            }
            _ => None,
        }
    }

    fn pending_deep_dive(&self) -> Option<Uuid> {
        match self {
            Screen::Report { deep_dive, .. } | Screen::Comparing { deep_dive, .. } => *deep_dive,
            _ => None,
        }
    }

    fn with_pending(&self, pending: Option<PendingComparison>) -> Screen {
        let mut screen = self.clone();
        if let Screen::Report { comparison, .. } | Screen::Comparing { comparison, .. } =
            &mut screen
        {
            *comparison = pending;
        }
        screen
    }

    fn with_deep_dive(&self, id: Option<Uuid>) -> Screen {
        let mut screen = self.clone();
        if let Screen::Report { deep_dive, .. } | Screen::Comparing { deep_dive, .. } = &mut screen
        {
            *deep_dive = id;
        }
        screen
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    pub screen: Screen,
    /// A verified identity is signed in
    pub verified: bool,
}

#[derive(Debug, Clone)]
pub enum Event {
    SignedIn,
    SignedOut,
    Search {
        address: String,
    },
    ReportFetched {
        id: Uuid,
        result: Result<PropertyReport, String>,
    },
    Compare {
        address: String,
    },
    ComparisonFetched {
        id: Uuid,
        result: Result<PropertyReport, String>,
    },
    /// Start streaming the primary report's deep analysis
    DeepDive,
    /// One streamed chunk of the deep analysis started under `id`
    DeepDiveChunk {
        id: Uuid,
        chunk: String,
    },
    DeepDiveFinished {
        id: Uuid,
    },
    /// Drop the second report and return to the single dashboard
    CloseComparison,
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ShowAuth,
    FetchReport { id: Uuid, address: String },
    FetchComparison { id: Uuid, address: String },
    StreamDeepDive { id: Uuid, report: PropertyReport },
    /// Streamed text, printed without a trailing newline
    Print(String),
    Notify(String),
    Render,
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Never mutate state directly
/// - Ignore completions with stale request ids
/// - Emit Render after every visible change
pub fn reduce(state: &AppState, event: Event) -> (AppState, Vec<Effect>) {
    use Effect::*;

    let with_screen = |screen: Screen| AppState {
        screen,
        verified: state.verified,
    };

    match (&state.screen, event) {
        // -----------------
        // Identity
        // -----------------
        (_, Event::SignedIn) => (
            AppState {
                screen: state.screen.clone(),
                verified: true,
            },
            vec![Render],
        ),
        (_, Event::SignedOut) => (AppState::default(), vec![Render]),

        // -----------------
        // Search
        // -----------------
        (_, Event::Search { .. }) if !state.verified => (state.clone(), vec![ShowAuth]),
        (Screen::Loading { .. }, Event::Search { .. }) => (state.clone(), vec![]),
        (_, Event::Search { address }) => {
            let address = address.trim().to_string();
            if address.is_empty() {
                return (state.clone(), vec![]);
            }
            let id = Uuid::new_v4();
            (
                with_screen(Screen::Loading {
                    request_id: id,
                    address: address.clone(),
                }),
                vec![FetchReport { id, address }, Render],
            )
        }

        (Screen::Loading { request_id, .. }, Event::ReportFetched { id, result })
            if *request_id == id =>
        {
            match result {
                Ok(report) => (
                    with_screen(Screen::Report {
                        report,
                        comparison: None,
                        deep_dive: None,
                    }),
                    vec![Render],
                ),
                Err(message) => (with_screen(Screen::Error { message }), vec![Render]),
            }
        }
        (_, Event::ReportFetched { id, .. }) => {
            log::debug!("Ignoring stale report completion {}", id);
            (state.clone(), vec![])
        }

        // -----------------
        // Comparison
        // -----------------
        (Screen::Report { .. } | Screen::Comparing { .. }, Event::Compare { address }) => {
            let address = address.trim().to_string();
            if address.is_empty() {
                return (state.clone(), vec![]);
            }
            let id = Uuid::new_v4();
            let pending = PendingComparison {
                request_id: id,
                address: address.clone(),
            };
            (
                with_screen(state.screen.with_pending(Some(pending))),
                vec![FetchComparison { id, address }, Render],
            )
        }
        (_, Event::Compare { .. }) => (state.clone(), vec![]),

        (screen, Event::ComparisonFetched { id, result })
            if screen.pending_comparison().map(|p| p.request_id) == Some(id) =>
        {
            match result {
                Ok(secondary) => {
                    let primary = screen.primary_report().cloned();
                    match primary {
                        Some(primary) => (
                            with_screen(Screen::Comparing {
                                primary,
                                secondary,
                                comparison: None,
                                deep_dive: screen.pending_deep_dive(),
                            }),
                            vec![Render],
                        ),
                        None => (state.clone(), vec![]),
                    }
                }
                Err(message) => (
                    with_screen(screen.with_pending(None)),
                    vec![
                        Notify(format!("{}{}", COMPARISON_FAILED_PREFIX, message)),
                        Render,
                    ],
                ),
            }
        }
        (_, Event::ComparisonFetched { id, .. }) => {
            log::debug!("Ignoring stale comparison completion {}", id);
            (state.clone(), vec![])
        }

        (
            Screen::Comparing {
                primary,
                comparison,
                deep_dive,
                ..
            },
            Event::CloseComparison,
        ) => (
            with_screen(Screen::Report {
                report: primary.clone(),
                comparison: comparison.clone(),
                deep_dive: *deep_dive,
            }),
            vec![Render],
        ),
        (_, Event::CloseComparison) => (state.clone(), vec![]),

        // -----------------
        // Deep dive
        // -----------------
        (screen, Event::DeepDive) => match screen.primary_report() {
            None => (state.clone(), vec![Notify("Search for a property first.".into())]),
            Some(_) if screen.pending_deep_dive().is_some() => {
                (state.clone(), vec![Notify(DEEP_DIVE_BUSY_MESSAGE.into())])
            }
            Some(report) if report.deep_analysis.is_some() => {
                (state.clone(), vec![Notify(DEEP_DIVE_DONE_MESSAGE.into())])
            }
            Some(report) => {
                let id = Uuid::new_v4();
                let report = report.clone();
                (
                    with_screen(screen.with_deep_dive(Some(id))),
                    vec![Notify("Deep dive:".into()), StreamDeepDive { id, report }],
                )
            }
        },

        (screen, Event::DeepDiveChunk { id, chunk }) if screen.pending_deep_dive() == Some(id) => {
            let mut screen = screen.clone();
            match &mut screen {
                Screen::Report { report, .. } => report.append_deep_analysis(&chunk),
                Screen::Comparing { primary, .. } => primary.append_deep_analysis(&chunk),
                _ => {}
            }
            (with_screen(screen), vec![Print(chunk)])
        }
        (_, Event::DeepDiveChunk { id, .. }) => {
            log::debug!("Ignoring deep-dive chunk from stale stream {}", id);
            (state.clone(), vec![])
        }

        (screen, Event::DeepDiveFinished { id }) if screen.pending_deep_dive() == Some(id) => (
            with_screen(screen.with_deep_dive(None)),
            vec![Print("\n".into())],
        ),
        (_, Event::DeepDiveFinished { .. }) => (state.clone(), vec![]),

        (_, Event::Reset) => (with_screen(Screen::Idle), vec![Render]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::model::fixtures::sample_report;
    use crate::report::REPORT_FAILURE_MESSAGE;

    fn signed_in() -> AppState {
        reduce(&AppState::default(), Event::SignedIn).0
    }

    fn search(state: &AppState, address: &str) -> (AppState, Uuid) {
        let (next, effects) = reduce(
            state,
            Event::Search {
                address: address.to_string(),
            },
        );
        let id = match &effects[0] {
            Effect::FetchReport { id, .. } => *id,
            other => panic!("expected FetchReport, got {:?}", other),
        };
        (next, id)
    }

    fn with_report() -> AppState {
        let (loading, id) = search(&signed_in(), "10 Downing Street");
        reduce(
            &loading,
            Event::ReportFetched {
                id,
                result: Ok(sample_report()),
            },
        )
        .0
    }

    fn other_report() -> PropertyReport {
        let mut report = sample_report();
        report.address = "1 High St, Leeds".to_string();
        report.postcode = "LS1 1AA".to_string();
        report
    }

    #[test]
    fn test_search_requires_verified_identity() {
        let state = AppState::default();
        let (next, effects) = reduce(
            &state,
            Event::Search {
                address: "10 Downing Street".into(),
            },
        );
        assert_eq!(next.screen, Screen::Idle);
        assert_eq!(effects, vec![Effect::ShowAuth]);
    }

    #[test]
    fn test_blank_search_ignored() {
        let state = signed_in();
        let (next, effects) = reduce(&state, Event::Search { address: "  ".into() });
        assert_eq!(next, state);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_search_to_report() {
        let (loading, id) = search(&signed_in(), "  10 Downing Street ");
        match &loading.screen {
            Screen::Loading { request_id, address } => {
                assert_eq!(*request_id, id);
                assert_eq!(address, "10 Downing Street");
            }
            other => panic!("expected Loading, got {:?}", other),
        }

        let (next, effects) = reduce(
            &loading,
            Event::ReportFetched {
                id,
                result: Ok(sample_report()),
            },
        );
        let report = next.screen.primary_report().unwrap();
        assert_eq!(report.postcode, "SW1A 2AA");
        assert_eq!(next.screen.name(), "report");
        assert_eq!(effects, vec![Effect::Render]);
    }

    #[test]
    fn test_search_failure_shows_message() {
        let (loading, id) = search(&signed_in(), "nowhere");
        let (next, _) = reduce(
            &loading,
            Event::ReportFetched {
                id,
                result: Err(REPORT_FAILURE_MESSAGE.to_string()),
            },
        );
        assert_eq!(
            next.screen,
            Screen::Error {
                message: REPORT_FAILURE_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn test_stale_report_dropped() {
        let (first, stale_id) = search(&signed_in(), "first");
        let reset = reduce(&first, Event::Reset).0;
        let (second, _) = search(&reset, "second");

        let (next, effects) = reduce(
            &second,
            Event::ReportFetched {
                id: stale_id,
                result: Ok(sample_report()),
            },
        );
        assert_eq!(next, second);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_search_ignored_while_loading() {
        let (loading, _) = search(&signed_in(), "first");
        let (next, effects) = reduce(&loading, Event::Search { address: "second".into() });
        assert_eq!(next, loading);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_compare_success() {
        let state = with_report();
        let (pending, effects) = reduce(&state, Event::Compare { address: "1 High St".into() });

        // The dashboard stays up while the comparison loads
        assert_eq!(pending.screen.name(), "report");
        let id = match &effects[0] {
            Effect::FetchComparison { id, address } => {
                assert_eq!(address, "1 High St");
                *id
            }
            other => panic!("expected FetchComparison, got {:?}", other),
        };

        let (next, _) = reduce(
            &pending,
            Event::ComparisonFetched {
                id,
                result: Ok(other_report()),
            },
        );
        match &next.screen {
            Screen::Comparing {
                primary, secondary, ..
            } => {
                assert_eq!(primary.postcode, "SW1A 2AA");
                assert_eq!(secondary.postcode, "LS1 1AA");
            }
            other => panic!("expected Comparing, got {:?}", other),
        }
    }

    #[test]
    fn test_compare_failure_keeps_report_and_notifies() {
        let state = with_report();
        let (pending, effects) = reduce(&state, Event::Compare { address: "nowhere".into() });
        let Effect::FetchComparison { id, .. } = effects[0].clone() else {
            panic!("expected FetchComparison");
        };

        let (next, effects) = reduce(
            &pending,
            Event::ComparisonFetched {
                id,
                result: Err(REPORT_FAILURE_MESSAGE.to_string()),
            },
        );
        assert_eq!(next, state);
        assert_eq!(
            effects[0],
            Effect::Notify(format!(
                "Could not fetch comparison address: {}",
                REPORT_FAILURE_MESSAGE
            ))
        );
    }

    #[test]
    fn test_compare_ignored_without_report() {
        let (next, effects) = reduce(&signed_in(), Event::Compare { address: "x".into() });
        assert_eq!(next.screen, Screen::Idle);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_close_comparison() {
        let state = with_report();
        let (pending, effects) = reduce(&state, Event::Compare { address: "b".into() });
        let Effect::FetchComparison { id, .. } = effects[0].clone() else {
            panic!("expected FetchComparison");
        };
        let comparing = reduce(
            &pending,
            Event::ComparisonFetched {
                id,
                result: Ok(other_report()),
            },
        )
        .0;

        let (next, _) = reduce(&comparing, Event::CloseComparison);
        assert_eq!(next, state);
    }

    fn start_deep_dive(state: &AppState) -> (AppState, Uuid) {
        let (next, effects) = reduce(state, Event::DeepDive);
        let id = effects
            .iter()
            .find_map(|e| match e {
                Effect::StreamDeepDive { id, .. } => Some(*id),
                _ => None,
            })
            .expect("expected StreamDeepDive");
        (next, id)
    }

    fn chunk(id: Uuid, text: &str) -> Event {
        Event::DeepDiveChunk {
            id,
            chunk: text.to_string(),
        }
    }

    #[test]
    fn test_deep_dive_chunks_accumulate() {
        let (mut state, id) = start_deep_dive(&with_report());
        for text in ["## Gentrification", " potential"] {
            let (next, effects) = reduce(&state, chunk(id, text));
            assert_eq!(effects, vec![Effect::Print(text.to_string())]);
            state = next;
        }
        assert_eq!(
            state.screen.primary_report().unwrap().deep_analysis.as_deref(),
            Some("## Gentrification potential")
        );

        let (done, _) = reduce(&state, Event::DeepDiveFinished { id });
        assert_eq!(done.screen.pending_deep_dive(), None);
        let (_, effects) = reduce(&done, Event::DeepDive);
        assert_eq!(effects, vec![Effect::Notify(DEEP_DIVE_DONE_MESSAGE.into())]);
    }

    #[test]
    fn test_deep_dive_chunk_from_previous_report_is_dropped() {
        let (streaming, stale_id) = start_deep_dive(&with_report());

        let (loading, id) = search(&streaming, "1 High St, Leeds");
        let second = reduce(
            &loading,
            Event::ReportFetched {
                id,
                result: Ok(other_report()),
            },
        )
        .0;

        let (next, effects) = reduce(&second, chunk(stale_id, "Westminster analysis"));
        assert_eq!(next, second);
        assert!(effects.is_empty());
        assert_eq!(next.screen.primary_report().unwrap().deep_analysis, None);

        // A fresh stream for the new report is allowed
        let (_, effects) = reduce(&next, Event::DeepDive);
        assert!(matches!(effects[1], Effect::StreamDeepDive { .. }));
    }

    #[test]
    fn test_second_deep_dive_refused_while_streaming() {
        let (streaming, id) = start_deep_dive(&with_report());

        let (next, effects) = reduce(&streaming, Event::DeepDive);
        assert_eq!(next, streaming);
        assert_eq!(effects, vec![Effect::Notify(DEEP_DIVE_BUSY_MESSAGE.into())]);

        let (next, _) = reduce(&next, chunk(id, "only stream"));
        assert_eq!(
            next.screen.primary_report().unwrap().deep_analysis.as_deref(),
            Some("only stream")
        );
    }

    #[test]
    fn test_deep_dive_survives_opening_comparison() {
        let (streaming, id) = start_deep_dive(&with_report());
        let (pending, effects) = reduce(&streaming, Event::Compare { address: "b".into() });
        let Effect::FetchComparison { id: compare_id, .. } = effects[0].clone() else {
            panic!("expected FetchComparison");
        };
        let comparing = reduce(
            &pending,
            Event::ComparisonFetched {
                id: compare_id,
                result: Ok(other_report()),
            },
        )
        .0;

        let (next, _) = reduce(&comparing, chunk(id, "still mine"));
        assert_eq!(next.screen.name(), "comparing");
        assert_eq!(
            next.screen.primary_report().unwrap().deep_analysis.as_deref(),
            Some("still mine")
        );
    }

    #[test]
    fn test_deep_dive_requires_report() {
        let (next, effects) = reduce(&signed_in(), Event::DeepDive);
        assert_eq!(next.screen, Screen::Idle);
        assert!(matches!(effects[0], Effect::Notify(_)));
    }

    #[test]
    fn test_reset_and_sign_out() {
        let state = with_report();
        let (reset, _) = reduce(&state, Event::Reset);
        assert_eq!(reset.screen, Screen::Idle);
        assert!(reset.verified);

        let (signed_out, _) = reduce(&state, Event::SignedOut);
        assert_eq!(signed_out, AppState::default());
    }
}
