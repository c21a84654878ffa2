//! Execution tracer (spec SPEC_FULL.md §2 "Logging / tracing"): an
//! opt-in, JSON-serializable record of each statement the dispatcher
//! runs, kept for diagnosing a run rather than for users.
//!
//! Grounded on the teacher's `trace.rs` almost verbatim: same
//! enable/disable gate, same `serde_json::to_string_pretty` dump, same
//! summary/detailed console reports. Adapted to this crate's line
//! numbers (`u16` rather than `u32`) and byte offsets (rather than a
//! statement index into a parsed AST), and to snapshot `Value`'s wider
//! variant set (`Tab`/`Spc` as well as `Number`/`Str`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub line_number: u16,
    pub offset: usize,
    pub statement_type: String,
    pub variables_snapshot: HashMap<String, String>,
    pub output: String,
}

#[derive(Debug, Default)]
pub struct ExecutionTracer {
    pub entries: Vec<TraceEntry>,
    pub enabled: bool,
    current_output: String,
}

impl ExecutionTracer {
    pub fn new() -> Self {
        ExecutionTracer {
            entries: Vec::new(),
            enabled: false,
            current_output: String::new(),
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn record_statement(
        &mut self,
        line_number: u16,
        offset: usize,
        statement_type: &str,
        variables: &HashMap<String, Value>,
    ) {
        if !self.enabled {
            return;
        }

        let mut var_snapshot = HashMap::new();
        for (name, value) in variables {
            let rendered = match value {
                Value::Number(n) => format!("{}", n),
                Value::Str(s) => format!("\"{}\"", s),
                Value::Tab(n) => format!("TAB({})", n),
                Value::Spc(n) => format!("SPC({})", n),
            };
            var_snapshot.insert(name.clone(), rendered);
        }

        self.entries.push(TraceEntry {
            line_number,
            offset,
            statement_type: statement_type.to_string(),
            variables_snapshot: var_snapshot,
            output: self.current_output.clone(),
        });
        self.current_output.clear();
    }

    pub fn record_output(&mut self, text: &str) {
        if self.enabled {
            self.current_output.push_str(text);
        }
    }

    pub fn save_to_json(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, json)
    }

    pub fn print_summary(&self) {
        println!("=== Execution Trace Summary ===");
        println!("Total statements executed: {}", self.entries.len());

        if let Some(first) = self.entries.first() {
            println!("First line: {}", first.line_number);
        }
        if let Some(last) = self.entries.last() {
            println!("Last line: {}", last.line_number);
        }

        let mut type_counts: HashMap<String, usize> = HashMap::new();
        for entry in &self.entries {
            *type_counts.entry(entry.statement_type.clone()).or_insert(0) += 1;
        }

        println!("\nStatement type counts:");
        let mut types: Vec<_> = type_counts.iter().collect();
        types.sort_by_key(|(_, count)| std::cmp::Reverse(**count));
        for (stmt_type, count) in types.iter().take(10) {
            println!("  {}: {}", stmt_type, count);
        }
    }

    pub fn print_detailed(&self, limit: Option<usize>) {
        println!("=== Detailed Execution Trace ===");
        let entries = match limit {
            Some(n) => &self.entries[..n.min(self.entries.len())],
            None => &self.entries[..],
        };

        for (i, entry) in entries.iter().enumerate() {
            println!(
                "\n[{}] Line {} @{}: {}",
                i, entry.line_number, entry.offset, entry.statement_type
            );
            if !entry.output.is_empty() {
                println!("  Output: {:?}", entry.output);
            }
            if !entry.variables_snapshot.is_empty() {
                println!("  Variables:");
                let mut vars: Vec<_> = entry.variables_snapshot.iter().collect();
                vars.sort_by_key(|(name, _)| name.as_str());
                for (name, value) in vars.iter().take(10) {
                    println!("    {} = {}", name, value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_tracer_records_nothing() {
        let mut tracer = ExecutionTracer::new();
        tracer.record_statement(10, 0, "FOR", &HashMap::new());
        assert!(tracer.entries.is_empty());
    }

    #[test]
    fn enabled_tracer_records_statements_and_output() {
        let mut tracer = ExecutionTracer::new();
        tracer.enable();

        let mut vars = HashMap::new();
        vars.insert("I".to_string(), Value::Number(1.0));

        tracer.record_output("HELLO");
        tracer.record_statement(10, 0, "PRINT", &vars);

        assert_eq!(tracer.entries.len(), 1);
        assert_eq!(tracer.entries[0].output, "HELLO");
        assert_eq!(tracer.entries[0].variables_snapshot["I"], "1");
    }
}
