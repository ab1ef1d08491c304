//! JSON output formatting

use serde::Serialize;
use songprint_core::SongMatch;

#[derive(Serialize)]
struct MatchOutput<'a> {
    query_path: &'a str,
    detections: usize,
    results: &'a [SongMatch],
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}

/// Print ranked matches with the query path and detection count
pub fn print_json_results(query_path: &str, results: &[SongMatch]) {
    print_json(&match_output(query_path, results));
}

fn match_output<'a>(query_path: &'a str, results: &'a [SongMatch]) -> MatchOutput<'a> {
    MatchOutput {
        query_path,
        detections: results.len(),
        results,
    }
}
