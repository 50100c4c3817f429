use std::fmt;

use tracing::Level;

use crate::model::Severity;

#[derive(Debug, Clone, Copy)]
pub enum AuditDomain {
    Config,
    Input,
    Detection,
    Render,
    Runtime,
}

impl AuditDomain {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditDomain::Config => "config",
            AuditDomain::Input => "input.decode",
            AuditDomain::Detection => "runtime.detection",
            AuditDomain::Render => "pdf.render",
            AuditDomain::Runtime => "runtime.pool",
        }
    }
}

impl fmt::Display for AuditDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured event for anything a reviewer should be able to audit later:
/// rejected configuration, degraded detectors, pool fallbacks.
#[derive(Debug, Clone, Copy)]
pub struct AuditEvent<'a> {
    pub level: Level,
    pub domain: AuditDomain,
    pub severity: Severity,
    pub kind: &'a str,
    pub detector: Option<&'a str>,
    pub input_id: Option<&'a str>,
    pub message: &'a str,
}

impl<'a> AuditEvent<'a> {
    pub fn new(domain: AuditDomain, kind: &'a str, message: &'a str) -> Self {
        Self { level: Level::WARN, domain, severity: Severity::Low, kind, detector: None, input_id: None, message }
    }

    pub fn detector(mut self, id: &'a str) -> Self {
        self.detector = Some(id);
        self
    }

    pub fn input(mut self, id: &'a str) -> Self {
        self.input_id = Some(id);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn emit(self) {
        macro_rules! audit {
            ($lvl:expr) => {
                tracing::event!(
                    $lvl,
                    audit = true,
                    domain = %self.domain,
                    severity = self.severity.as_str(),
                    kind = self.kind,
                    detector = self.detector,
                    input_id = self.input_id,
                    "{message}",
                    message = self.message
                )
            };
        }
        match self.level {
            Level::TRACE => audit!(Level::TRACE),
            Level::DEBUG => audit!(Level::DEBUG),
            Level::INFO => audit!(Level::INFO),
            Level::WARN => audit!(Level::WARN),
            _ => audit!(Level::ERROR),
        }
    }
}
