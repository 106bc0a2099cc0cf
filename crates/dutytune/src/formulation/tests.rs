use approx::assert_relative_eq;
use dutytune_core::OptimizationProblem;

use super::*;

const SQP: Capabilities = Capabilities {
    supports_native_bounds: true,
    supports_nonlinear_constraints: true,
};

const COBYLA: Capabilities = Capabilities {
    supports_native_bounds: false,
    supports_nonlinear_constraints: true,
};

const LBFGSB: Capabilities = Capabilities {
    supports_native_bounds: true,
    supports_nonlinear_constraints: false,
};

fn limits() -> Vec<LimitSpec> {
    vec![
        LimitSpec {
            name: "H2S".into(),
            limit_ppm: 0.2,
        },
        LimitSpec {
            name: "NH3".into(),
            limit_ppm: 15.0,
        },
    ]
}

fn outputs(h2s_ppm: f64, nh3_ppm: f64) -> SimulationOutputs {
    [("H2S", h2s_ppm * 1e-6), ("NH3", nh3_ppm * 1e-6)]
        .into_iter()
        .collect()
}

/// QN1, QN2, QC, SF with SF excluded from the cost.
fn problem(capabilities: Capabilities, kind: FormulationKind) -> TuningProblem {
    let scale = ScaleFactors::new(vec![1e5, 1e5, 1.0, 0.1]).unwrap();
    let bounds = vec![
        (450_000.0, 600_000.0),
        (700_000.0, 1_200_000.0),
        (1.0, 5.0),
        (0.0, 1.0),
    ];
    let scaled = scale.to_scaled_bounds(&bounds);
    let formulation = Formulation::select(capabilities, kind, limits(), &scaled, 1e6).unwrap();
    TuningProblem::new(
        scale,
        vec![true, true, true, false],
        bounds,
        capabilities.supports_native_bounds,
        formulation,
    )
}

#[test]
fn auto_follows_capabilities() {
    let sqp = problem(SQP, FormulationKind::Auto);
    assert!(!sqp.formulation().is_penalized());
    assert_eq!(sqp.constraint_count(), 2);

    let cobyla = problem(COBYLA, FormulationKind::Auto);
    assert!(!cobyla.formulation().is_penalized());
    assert_eq!(cobyla.constraint_count(), 2 + 2 * 4);

    let lbfgsb = problem(LBFGSB, FormulationKind::Auto);
    assert!(lbfgsb.formulation().is_penalized());
    assert_eq!(lbfgsb.constraint_count(), 0);
}

#[test]
fn constrained_needs_constraint_support() {
    let err = Formulation::select(LBFGSB, FormulationKind::Constrained, limits(), &[], 1e6)
        .unwrap_err();
    assert_eq!(err, FormulationError::ConstraintsUnsupported);

    let neither = Capabilities {
        supports_native_bounds: false,
        supports_nonlinear_constraints: false,
    };
    let err =
        Formulation::select(neither, FormulationKind::Penalized, limits(), &[], 1e6).unwrap_err();
    assert_eq!(err, FormulationError::BoundsUnsupported);
}

#[test]
fn cost_is_monotonic_and_ignores_split_fraction() {
    let problem = problem(SQP, FormulationKind::Auto);
    let out = outputs(0.1, 10.0);
    let cost = |x: [f64; 4]| {
        let input = problem.input(&x).unwrap();
        problem.objective(&input, &out).unwrap()
    };

    let base = cost([5.0, 9.0, 2.0, 5.0]);
    assert_relative_eq!(base, 500_000.0 + 900_000.0 + 2.0);

    assert!(cost([5.1, 9.0, 2.0, 5.0]) > base);
    assert!(cost([5.0, 9.1, 2.0, 5.0]) > base);
    assert!(cost([5.0, 9.0, 2.1, 5.0]) > base);
    assert_eq!(cost([5.0, 9.0, 2.0, 1.0]), base);
    assert_eq!(cost([5.0, 9.0, 2.0, 9.0]), base);
}

#[test]
fn residual_is_exactly_zero_at_the_limit() {
    let out = outputs(0.2, 15.0);
    let at_limit: Vec<LimitSpec> = ["H2S", "NH3"]
        .into_iter()
        .map(|name| LimitSpec {
            name: name.into(),
            limit_ppm: out.ppm(name).unwrap(),
        })
        .collect();

    let formulation =
        Formulation::select(SQP, FormulationKind::Constrained, at_limit, &[], 1e6).unwrap();
    let problem = TuningProblem::new(
        ScaleFactors::new(vec![1.0]).unwrap(),
        vec![true],
        vec![(0.0, 10.0)],
        true,
        formulation,
    );

    let input = problem.input(&[1.0]).unwrap();
    let residuals = problem.constraints(&input, &out).unwrap();
    assert_eq!(residuals, vec![0.0, 0.0]);
}

#[test]
fn residual_sign_follows_the_limit() {
    let problem = problem(SQP, FormulationKind::Auto);
    let input = problem.input(&[5.0, 9.0, 2.0, 5.0]).unwrap();

    let ok = problem.constraints(&input, &outputs(0.1, 10.0)).unwrap();
    assert!(ok.iter().all(|r| *r > 0.0));

    let bad = problem.constraints(&input, &outputs(0.3, 20.0)).unwrap();
    assert_relative_eq!(bad[0], -0.1, epsilon = 1e-9);
    assert_relative_eq!(bad[1], -5.0, epsilon = 1e-9);
}

#[test]
fn penalty_vanishes_when_limits_hold() {
    let problem = problem(LBFGSB, FormulationKind::Auto);
    let input = problem.input(&[5.0, 9.0, 2.0, 5.0]).unwrap();

    let penalized = problem.objective(&input, &outputs(0.1, 10.0)).unwrap();
    assert_eq!(penalized, problem.base_cost(&input));
}

#[test]
fn penalties_add_across_violated_limits() {
    let problem = problem(LBFGSB, FormulationKind::Auto);
    let input = problem.input(&[5.0, 9.0, 2.0, 5.0]).unwrap();
    let base = problem.base_cost(&input);

    let (d1, d2) = (0.05, 2.0);
    let only_h2s = problem.objective(&input, &outputs(0.2 + d1, 10.0)).unwrap() - base;
    let only_nh3 = problem.objective(&input, &outputs(0.1, 15.0 + d2)).unwrap() - base;
    let both = problem
        .objective(&input, &outputs(0.2 + d1, 15.0 + d2))
        .unwrap()
        - base;

    assert_relative_eq!(only_h2s, 1e6 * d1 * d1, max_relative = 1e-6);
    assert_relative_eq!(only_nh3, 1e6 * d2 * d2, max_relative = 1e-6);
    assert_relative_eq!(both, only_h2s + only_nh3, max_relative = 1e-9);
}

#[test]
fn box_bounds_become_residual_pairs() {
    let problem = problem(COBYLA, FormulationKind::Auto);
    let input = problem.input(&[4.5, 12.0, 3.0, 11.0]).unwrap();
    let residuals = problem.constraints(&input, &outputs(0.1, 10.0)).unwrap();

    // H2S, NH3, then (lower, upper) per variable.
    assert_eq!(residuals.len(), 10);
    assert_relative_eq!(residuals[2], 0.0, epsilon = 1e-12);
    assert_relative_eq!(residuals[3], 1.5, epsilon = 1e-12);
    assert_relative_eq!(residuals[5], 0.0, epsilon = 1e-12);
    assert_relative_eq!(residuals[9], -1.0, epsilon = 1e-12);

    let names = problem
        .formulation()
        .constraint_names(&["QN1".into(), "QN2".into(), "QC".into(), "SF".into()]);
    assert_eq!(names[0], "H2S");
    assert_eq!(names[2], "QN1.lower");
    assert_eq!(names[9], "SF.upper");
}

#[test]
fn native_bounds_clamp_rounding_at_the_edge() {
    let problem = problem(SQP, FormulationKind::Auto);
    let input = problem.input(&[4.5 - 1e-12, 12.0 + 1e-12, 3.0, 0.0]).unwrap();
    assert_eq!(input.as_slice()[0], 450_000.0);
    assert_eq!(input.as_slice()[1], 1_200_000.0);
}

#[test]
fn missing_output_is_reported() {
    let problem = problem(SQP, FormulationKind::Auto);
    let input = problem.input(&[5.0, 9.0, 2.0, 5.0]).unwrap();
    let only_h2s: SimulationOutputs = [("H2S", 0.1e-6)].into_iter().collect();

    let err = problem.constraints(&input, &only_h2s).unwrap_err();
    assert_eq!(
        err,
        FormulationError::MissingOutput {
            name: "NH3".into()
        }
    );
}

#[test]
fn limit_violation_is_reported_in_either_form() {
    let over = outputs(0.2776, 10.0);
    let within = outputs(0.1, 15.0);

    for capabilities in [SQP, COBYLA, LBFGSB] {
        let formulation = problem(capabilities, FormulationKind::Auto).formulation().clone();
        assert_eq!(formulation.limits().count(), 2);
        assert_relative_eq!(
            formulation.limit_violation(&over).unwrap(),
            0.0776,
            epsilon = 1e-9
        );
        assert_eq!(formulation.limit_violation(&within).unwrap(), 0.0);
    }
}
