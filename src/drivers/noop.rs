use stackgraph::{ActionResult, Status, reasons};

use super::{ActionDriver, DriverRequest};

/// Driver for placeholder stacks: never changes anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDriver;

impl NoopDriver {
    pub const TAG: &'static str = "noop";
}

impl ActionDriver for NoopDriver {
    fn tag(&self) -> &'static str {
        Self::TAG
    }

    fn build(&self, _request: &DriverRequest<'_>) -> ActionResult {
        Ok(Status::skipped(reasons::NO_CHANGE).into())
    }

    fn destroy(&self, _request: &DriverRequest<'_>) -> ActionResult {
        Ok(Status::skipped(reasons::NO_CHANGE).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_noop_is_always_nochange() {
        let variables = BTreeMap::new();
        let status = Status::Submitted { reason: None };
        let request = DriverRequest {
            stack: "placeholder",
            namespace: "dev",
            variables: &variables,
            status: &status,
        };

        for result in [NoopDriver.build(&request), NoopDriver.destroy(&request)] {
            assert_eq!(result.unwrap().status, Status::skipped(reasons::NO_CHANGE));
        }
    }
}
