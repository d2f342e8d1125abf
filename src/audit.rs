//! In-session audit trail. Every turn that reaches the validator is
//! recorded with its verdict and, when executed, its outcome, and mirrored
//! as a structured tracing event on the `audit` target.

use std::time::SystemTime;

use tracing::info;

use crate::safety::Decision;

#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub timestamp: SystemTime,
    pub utterance: String,
    pub tool: String,
    pub command: String,
    pub decision: Decision,
    pub executed: bool,
    pub success: Option<bool>,
}

impl AuditRecord {
    pub fn to_json(&self) -> String {
        let unix_secs = self
            .timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        serde_json::json!({
            "timestamp": unix_secs,
            "utterance": self.utterance,
            "tool": self.tool,
            "command": self.command,
            "decision": format!("{:?}", self.decision),
            "executed": self.executed,
            "success": self.success,
        })
        .to_string()
    }
}

#[derive(Debug, Default)]
pub struct AuditTrail {
    records: Vec<AuditRecord>,
}

impl AuditTrail {
    pub fn record(&mut self, record: AuditRecord) {
        info!(
            target: "audit",
            utterance = %record.utterance,
            tool = %record.tool,
            command = %record.command,
            decision = ?record.decision,
            executed = record.executed,
            success = ?record.success,
            "turn"
        );
        self.records.push(record);
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    /// One JSON object per line, for piping into log tooling.
    pub fn to_json_lines(&self) -> String {
        self.records
            .iter()
            .map(AuditRecord::to_json)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate_in_order() {
        let mut trail = AuditTrail::default();
        for (i, decision) in [Decision::Allow, Decision::Block].into_iter().enumerate() {
            trail.record(AuditRecord {
                timestamp: SystemTime::now(),
                utterance: format!("utterance {i}"),
                tool: "list_files".to_owned(),
                command: "ls".to_owned(),
                decision,
                executed: decision == Decision::Allow,
                success: (decision == Decision::Allow).then_some(true),
            });
        }
        assert_eq!(trail.len(), 2);
        assert_eq!(trail.records()[1].decision, Decision::Block);
        assert!(!trail.records()[1].executed);

        let json = trail.to_json_lines();
        assert_eq!(json.lines().count(), 2);
        assert!(json.contains("\"decision\":\"Block\""));
    }
}
