use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{debug, info};
use serde::Serialize;

use super::event_log::{Case, EventLog};
use super::stats::mean;
use crate::error::Result;
use crate::report::{MapFormat, ProcessMap, ProcessMapStatistics};

pub const DEFAULT_MAX_RENDERED_EDGES: usize = 50;

const START_FILL: &str = "#90EE90";

/// Transition graph of a log, before rendering.
#[derive(Debug, Default)]
struct TransitionGraph<'a> {
    activities: BTreeSet<&'a str>,
    /// Sorted by count descending, then by endpoints.
    transitions: Vec<((&'a str, &'a str), usize)>,
    start_activities: Vec<(&'a str, usize)>,
    end_activities: Vec<(&'a str, usize)>,
    path_lengths: Vec<f64>,
    max_parallel_activities: usize,
}

#[derive(Serialize)]
struct JsonTransition<'a> {
    from: &'a str,
    to: &'a str,
    count: usize,
}

#[derive(Serialize)]
struct JsonProcessMap<'a> {
    activities: Vec<&'a str>,
    transitions: Vec<JsonTransition<'a>>,
    start_activities: IndexMap<&'a str, usize>,
    end_activities: IndexMap<&'a str, usize>,
}

/// Builds the transition graph of a log and renders it in `format`.
///
/// Rendered diagrams keep only the `max_edges` most frequent transitions; the
/// JSON document and `transition_frequencies` always carry every transition.
///
/// # Errors
///
/// Returns an error only if the JSON document cannot be serialized.
pub fn generate_process_map(
    log: &EventLog,
    format: MapFormat,
    max_edges: usize,
) -> Result<ProcessMap> {
    info!("Generating {format} process map from {} events", log.len());

    if log.is_empty() {
        return Ok(ProcessMap {
            process_map: String::new(),
            statistics: ProcessMapStatistics::default(),
            format,
        });
    }

    let cases = log.cases();
    let graph = build_graph(&cases);

    let process_map = match format {
        MapFormat::Mermaid => render_mermaid(&graph, max_edges),
        MapFormat::Dot => render_dot(&graph, max_edges),
        MapFormat::Json => render_json(&graph)?,
    };

    debug!(
        "Process map has {} activities and {} distinct transitions",
        graph.activities.len(),
        graph.transitions.len()
    );

    Ok(ProcessMap {
        process_map,
        statistics: statistics(&graph),
        format,
    })
}

#[allow(clippy::cast_precision_loss)]
fn build_graph<'a>(cases: &[Case<'a>]) -> TransitionGraph<'a> {
    let mut activities = BTreeSet::new();
    let mut transitions: HashMap<(&str, &str), usize> = HashMap::new();
    let mut starts: HashMap<&str, usize> = HashMap::new();
    let mut ends: HashMap<&str, usize> = HashMap::new();
    let mut path_lengths = Vec::with_capacity(cases.len());
    let mut max_parallel_activities = 0;

    for case in cases {
        let sequence = case.activity_sequence();
        let (Some(first), Some(last)) = (sequence.first(), sequence.last()) else {
            continue;
        };

        activities.extend(sequence.iter().copied());
        *starts.entry(*first).or_insert(0) += 1;
        *ends.entry(*last).or_insert(0) += 1;
        path_lengths.push(sequence.len() as f64);
        max_parallel_activities = max_parallel_activities.max(max_overlap(case));

        for pair in sequence.windows(2) {
            *transitions.entry((pair[0], pair[1])).or_insert(0) += 1;
        }
    }

    let mut transitions: Vec<_> = transitions.into_iter().collect();
    transitions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    TransitionGraph {
        activities,
        transitions,
        start_activities: ranked_counts(starts),
        end_activities: ranked_counts(ends),
        path_lengths,
        max_parallel_activities,
    }
}

fn ranked_counts(counts: HashMap<&str, usize>) -> Vec<(&str, usize)> {
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
}

/// Largest number of events of one case running at the same moment.
///
/// An event occupies `[timestamp, timestamp + duration]`. One that ends exactly
/// when the next begins does not overlap it; events starting together do.
/// Sweeps the time-ordered events, keeping the ends of those still running.
fn max_overlap(case: &Case<'_>) -> usize {
    let mut running: BinaryHeap<Reverse<DateTime<Utc>>> = BinaryHeap::new();
    let mut peak = 0;

    for starting in case.events.chunk_by(|a, b| a.timestamp == b.timestamp) {
        let start = starting[0].timestamp;
        while running.peek().is_some_and(|Reverse(end)| *end <= start) {
            running.pop();
        }
        peak = peak.max(running.len() + starting.len());
        running.extend(starting.iter().map(|event| Reverse(event.end())));
    }

    peak
}

/// `from->to` key; `\` and `>` inside names are backslash-escaped so keys stay distinct.
fn transition_key(from: &str, to: &str) -> String {
    fn escape(name: &str) -> Cow<'_, str> {
        if name.contains(['\\', '>']) {
            Cow::Owned(name.replace('\\', "\\\\").replace('>', "\\>"))
        } else {
            Cow::Borrowed(name)
        }
    }
    format!("{}->{}", escape(from), escape(to))
}

fn statistics(graph: &TransitionGraph<'_>) -> ProcessMapStatistics {
    ProcessMapStatistics {
        total_activities: graph.activities.len(),
        total_transitions: graph.transitions.len(),
        start_activities: graph
            .start_activities
            .iter()
            .map(|(activity, _)| (*activity).to_string())
            .collect(),
        end_activities: graph
            .end_activities
            .iter()
            .map(|(activity, _)| (*activity).to_string())
            .collect(),
        avg_path_length: mean(&graph.path_lengths),
        max_parallel_activities: graph.max_parallel_activities,
        transition_frequencies: graph
            .transitions
            .iter()
            .map(|((from, to), count)| (transition_key(from, to), *count))
            .collect(),
    }
}

/// Assigns `A0`, `A1`, … to activities in alphabetical order.
fn node_ids<'a>(graph: &TransitionGraph<'a>) -> HashMap<&'a str, String> {
    graph
        .activities
        .iter()
        .enumerate()
        .map(|(idx, activity)| (*activity, format!("A{idx}")))
        .collect()
}

fn is_start(graph: &TransitionGraph<'_>, activity: &str) -> bool {
    graph.start_activities.iter().any(|(a, _)| *a == activity)
}

fn render_mermaid(graph: &TransitionGraph<'_>, max_edges: usize) -> String {
    let ids = node_ids(graph);
    let mut out = String::from("graph TD\n");

    for activity in &graph.activities {
        let label = activity.replace('"', "#quot;");
        let class = if is_start(graph, activity) {
            ":::start"
        } else {
            ""
        };
        let _ = writeln!(out, "    {}[\"{label}\"]{class}", ids[activity]);
    }

    for ((from, to), count) in graph.transitions.iter().take(max_edges) {
        let _ = writeln!(out, "    {} -->|{count}| {}", ids[from], ids[to]);
    }

    let _ = write!(out, "    classDef start fill:{START_FILL}");
    out
}

fn render_dot(graph: &TransitionGraph<'_>, max_edges: usize) -> String {
    let ids = node_ids(graph);
    let mut out = String::from("digraph process {\n    rankdir=LR;\n    node [shape=box, style=rounded];\n");

    for activity in &graph.activities {
        let label = activity.replace('\\', "\\\\").replace('"', "\\\"");
        if is_start(graph, activity) {
            let _ = writeln!(
                out,
                "    {} [label=\"{label}\", style=\"rounded,filled\", fillcolor=\"{START_FILL}\"];",
                ids[activity]
            );
        } else {
            let _ = writeln!(out, "    {} [label=\"{label}\"];", ids[activity]);
        }
    }

    for ((from, to), count) in graph.transitions.iter().take(max_edges) {
        let _ = writeln!(out, "    {} -> {} [label=\"{count}\"];", ids[from], ids[to]);
    }

    out.push('}');
    out
}

fn render_json(graph: &TransitionGraph<'_>) -> Result<String> {
    let document = JsonProcessMap {
        activities: graph.activities.iter().copied().collect(),
        transitions: graph
            .transitions
            .iter()
            .map(|&((from, to), count)| JsonTransition { from, to, count })
            .collect(),
        start_activities: graph.start_activities.iter().copied().collect(),
        end_activities: graph.end_activities.iter().copied().collect(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}
