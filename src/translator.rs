//! Turns worker outcomes into caller-facing results.

use crate::executor::WorkerOutcome;
use crate::types::{EngineFaultCategory, ExecutionFault, InvocationResult};

/// Message reported when the program ran but never bound its result
pub const MISSING_RESULT_MESSAGE: &str = "program completed without producing a result";

/// Normalize `outcome` for the invocation of `entry_point`.
///
/// Never fails: every outcome, including a crashed worker, becomes either a
/// value or a fault.
pub fn translate(entry_point: &str, outcome: WorkerOutcome) -> InvocationResult {
    match outcome {
        WorkerOutcome::Returned(value) => InvocationResult::Value(value),
        WorkerOutcome::Raised { category, message } => fault(entry_point, category, message),
        WorkerOutcome::MissingResult => fault(
            entry_point,
            EngineFaultCategory::Internal.to_string(),
            MISSING_RESULT_MESSAGE.to_string(),
        ),
        WorkerOutcome::Crashed { detail } => fault(
            entry_point,
            EngineFaultCategory::Infrastructure.to_string(),
            detail,
        ),
    }
}

fn fault(entry_point: &str, category: String, message: String) -> InvocationResult {
    InvocationResult::Fault(ExecutionFault {
        entry_point: entry_point.to_string(),
        category,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TransportValue;

    #[test]
    fn test_value_passes_through() {
        let result = translate("add", WorkerOutcome::Returned(TransportValue::Integer(5)));
        assert_eq!(result, InvocationResult::Value(TransportValue::Integer(5)));
    }

    #[test]
    fn test_null_is_a_value_not_a_fault() {
        let result = translate("noop", WorkerOutcome::Returned(TransportValue::Null));
        assert!(result.is_value());
    }

    #[test]
    fn test_raised_keeps_category_and_message() {
        let result = translate(
            "missing",
            WorkerOutcome::Raised {
                category: "NameError".into(),
                message: "name 'missing' is not defined".into(),
            },
        );
        let fault = result.fault().unwrap();
        assert_eq!(fault.entry_point, "missing");
        assert_eq!(fault.category, "NameError");
        assert_eq!(fault.message, "name 'missing' is not defined");
        assert_eq!(
            fault.to_string(),
            "Error occurred while executing \"missing\": NameError: name 'missing' is not defined"
        );
    }

    #[test]
    fn test_missing_result_is_internal() {
        let result = translate("f", WorkerOutcome::MissingResult);
        let fault = result.fault().unwrap();
        assert_eq!(fault.category, "internal");
        assert_eq!(fault.message, MISSING_RESULT_MESSAGE);
    }

    #[test]
    fn test_crash_is_infrastructure() {
        let result = translate(
            "boom",
            WorkerOutcome::Crashed {
                detail: "worker process was terminated by signal 9".into(),
            },
        );
        let fault = result.fault().unwrap();
        assert_eq!(fault.category, "infrastructure");
        assert!(fault.message.contains("signal 9"));
    }
}
