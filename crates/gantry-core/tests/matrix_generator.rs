//! Tests for deployment matrix generation.

mod support;

use gantry_core::label::{DeployLabel, Stack};
use gantry_core::matrix;

use support::sample_config;

#[test]
fn resolves_the_documented_example() {
    let config = sample_config();
    let labels = vec![
        DeployLabel::new("order-service", "staging").with_stack(Stack::Terragrunt),
    ];

    let matrix = matrix::generate(&labels, &config);
    assert!(matrix.has_deployments());
    let item = &matrix.items[0];
    assert_eq!(item.working_directory, "order-service/terragrunt/envs/staging");
    assert_eq!(item.aws_region, "ap-northeast-1");
    assert_eq!(
        item.iam_role_plan.as_deref(),
        Some("arn:aws:iam::123:role/plan-staging")
    );
    assert_eq!(
        item.iam_role_apply.as_deref(),
        Some("arn:aws:iam::123:role/apply-staging")
    );
    assert_eq!(item.terraform_version.as_deref(), Some("1.12.1"));
    assert_eq!(item.terragrunt_version.as_deref(), Some("0.81.0"));
}

#[test]
fn generation_is_pure() {
    let config = sample_config();
    let labels = vec![
        DeployLabel::new("orders", "staging"),
        DeployLabel::new("cart", "develop"),
    ];

    let first = matrix::generate(&labels, &config);
    let second = matrix::generate(&labels, &config);
    assert_eq!(first, second);

    let first_json = serde_json::to_string(&first.items).unwrap();
    let second_json = serde_json::to_string(&second.items).unwrap();
    assert_eq!(first_json, second_json);
}

#[test]
fn invalid_labels_never_appear_in_output() {
    let config = sample_config();
    let labels = vec![
        DeployLabel::new("", "staging"),
        DeployLabel::new("orders", ""),
        DeployLabel::new("orders", "staging"),
    ];

    let matrix = matrix::generate(&labels, &config);
    assert_eq!(matrix.items.len(), 1);
    assert_eq!(matrix.items[0].service, "orders");
}

#[test]
fn unresolvable_labels_are_silently_omitted() {
    let config = sample_config();
    let labels = vec![
        DeployLabel::new("orders", "staging"),
        // unknown environment: present in input, absent from output
        DeployLabel::new("orders", "qa"),
    ];

    let matrix = matrix::generate(&labels, &config);
    assert_eq!(labels.len(), 2);
    assert_eq!(matrix.items.len(), 1);
}

#[test]
fn missing_convention_omits_the_label() {
    let mut config = sample_config();
    config.directory_conventions.kubernetes = None;

    let labels = vec![
        DeployLabel::new("orders", "staging").with_stack(Stack::Kubernetes),
        DeployLabel::new("orders", "staging"),
    ];

    let matrix = matrix::generate(&labels, &config);
    assert_eq!(matrix.items.len(), 1);
    assert_eq!(matrix.items[0].stack, Stack::Terragrunt);
}

#[test]
fn output_order_follows_input_order() {
    let config = sample_config();
    let labels = vec![
        DeployLabel::new("zeta", "staging"),
        DeployLabel::new("alpha", "staging"),
        DeployLabel::new("mid", "develop"),
    ];

    let matrix = matrix::generate(&labels, &config);
    let services: Vec<&str> = matrix.items.iter().map(|i| i.service.as_str()).collect();
    assert_eq!(services, ["zeta", "alpha", "mid"]);
}

#[test]
fn branch_derived_labels_default_to_terragrunt() {
    let config = sample_config();
    let labels = vec![DeployLabel::new("orders", "develop")];

    let matrix = matrix::generate(&labels, &config);
    assert_eq!(matrix.items[0].stack, Stack::Terragrunt);
}

#[test]
fn kubernetes_items_carry_no_iam_roles() {
    let config = sample_config();
    let labels = vec![DeployLabel::new("orders", "staging").with_stack(Stack::Kubernetes)];

    let matrix = matrix::generate(&labels, &config);
    let item = &matrix.items[0];
    assert_eq!(item.stack, Stack::Kubernetes);
    assert_eq!(item.working_directory, "orders/kubernetes/overlays/staging");
    assert!(item.iam_role_plan.is_none());
    assert!(item.iam_role_apply.is_none());
}
