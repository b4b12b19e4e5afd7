//! Ordered plan consumed by the compound (streaming join) operator.
//!
//! The planner that produces it lives outside this workspace; here a plan is
//! just an immutable list of opaque step ids.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::id::StepId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<StepId>", into = "Vec<StepId>")]
pub struct Plan {
    steps: Arc<[StepId]>,
}

impl Plan {
    pub fn new<I, S>(steps: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        let steps: Vec<StepId> = steps.into_iter().map(Into::into).collect();
        if steps.is_empty() {
            return Err(Error::Plan("plan must contain at least one step".into()));
        }
        Ok(Self {
            steps: steps.into(),
        })
    }

    pub fn steps(&self) -> &[StepId] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn first(&self) -> Option<&StepId> {
        self.steps.first()
    }

    /// Steps after the first one, or `None` when this is the last step.
    pub fn rest(&self) -> Option<Plan> {
        if self.steps.len() <= 1 {
            None
        } else {
            Some(Self {
                steps: self.steps[1..].into(),
            })
        }
    }
}

impl TryFrom<Vec<StepId>> for Plan {
    type Error = Error;

    fn try_from(steps: Vec<StepId>) -> Result<Self> {
        Plan::new(steps)
    }
}

impl From<Plan> for Vec<StepId> {
    fn from(plan: Plan) -> Self {
        plan.steps.to_vec()
    }
}
