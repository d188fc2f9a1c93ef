use std::collections::HashMap;

use gantry_models::Environment;

use crate::error::{AddonError, AddonResult};
use crate::provider::{RemotePlan, RemoteServiceSpec};

/// How the plan for each environment of a binding is chosen.
#[derive(Debug, Clone)]
pub enum PlanSelector {
    /// One plan for every environment.
    Fixed(String),
    /// Explicit plan per environment; a missing entry is refused.
    PerEnvironment(HashMap<Environment, String>),
    /// The first active plan the service sells.
    Default,
}

/// Resolves the selector against what the service actually sells. A spec
/// that publishes no plans cannot validate a fixed choice and lets it
/// through.
pub fn select_plan(
    selector: &PlanSelector,
    environment: Environment,
    spec: &RemoteServiceSpec,
) -> AddonResult<String> {
    let plan_id = match selector {
        PlanSelector::Fixed(plan_id) => plan_id.clone(),
        PlanSelector::PerEnvironment(map) => map.get(&environment).cloned().ok_or_else(|| {
            AddonError::Validation(format!("no plan declared for environment {environment}"))
        })?,
        PlanSelector::Default => default_plan(spec)?.uuid.clone(),
    };
    if !spec.plans.is_empty() && !spec.plans.iter().any(|plan| plan.uuid == plan_id) {
        return Err(AddonError::Validation(format!(
            "plan {plan_id} is not sold by service {}",
            spec.name
        )));
    }
    Ok(plan_id)
}

fn default_plan(spec: &RemoteServiceSpec) -> AddonResult<&RemotePlan> {
    spec.plans
        .iter()
        .find(|plan| plan.is_active)
        .or_else(|| spec.plans.first())
        .ok_or_else(|| AddonError::Validation(format!("service {} sells no plans", spec.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn spec(plans: Vec<RemotePlan>) -> RemoteServiceSpec {
        RemoteServiceSpec {
            uuid: "svc-1".to_string(),
            name: "mysql".to_string(),
            version: "0.2.0".to_string(),
            parameter_template: Default::default(),
            plans,
        }
    }

    fn plan(uuid: &str, is_active: bool) -> RemotePlan {
        RemotePlan {
            uuid: uuid.to_string(),
            name: uuid.to_string(),
            is_active,
            properties: Value::Null,
        }
    }

    #[test]
    fn default_picks_the_first_active_plan() {
        let spec = spec(vec![plan("retired", false), plan("basic", true)]);
        let chosen = select_plan(&PlanSelector::Default, Environment::Stag, &spec).unwrap();
        assert_eq!(chosen, "basic");
    }

    #[test]
    fn per_environment_map_must_cover_the_environment() {
        let mut map = HashMap::new();
        map.insert(Environment::Stag, "basic".to_string());
        let spec = spec(vec![plan("basic", true)]);

        let selector = PlanSelector::PerEnvironment(map);
        assert_eq!(
            select_plan(&selector, Environment::Stag, &spec).unwrap(),
            "basic"
        );
        assert!(matches!(
            select_plan(&selector, Environment::Prod, &spec),
            Err(AddonError::Validation(_))
        ));
    }

    #[test]
    fn fixed_plan_must_exist_when_plans_are_published() {
        let spec_with_plans = spec(vec![plan("basic", true)]);
        assert!(matches!(
            select_plan(
                &PlanSelector::Fixed("gold".to_string()),
                Environment::Stag,
                &spec_with_plans,
            ),
            Err(AddonError::Validation(_))
        ));

        // No published plans: the fixed choice cannot be checked here.
        let opaque_spec = spec(vec![]);
        assert_eq!(
            select_plan(
                &PlanSelector::Fixed("gold".to_string()),
                Environment::Stag,
                &opaque_spec,
            )
            .unwrap(),
            "gold"
        );
    }

    #[test]
    fn default_with_no_plans_is_refused() {
        let spec = spec(vec![]);
        assert!(matches!(
            select_plan(&PlanSelector::Default, Environment::Stag, &spec),
            Err(AddonError::Validation(_))
        ));
    }
}
