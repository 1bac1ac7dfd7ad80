use std::rc::Rc;

use approx::assert_relative_eq;
use ndarray::array;
use rewind_core::{Vector, vector};
use rewind_solvers::krylov::{BiCgStab, ConjugateGradient};
use rewind_tape::{
    FinalFunctional, FunctionalSum, Instant, MatrixFree, Policy, PointFunctional,
    ReducedFunctional, Tape, TimeIntegral, TimeSlice, blocks::LinearCombination,
    verify::TaylorConfig,
};

use integration_tests::{
    Total,
    models::{self, Heat},
    operators::{Advection, Diffusion, Jacobi},
};

fn initial() -> Vector {
    array![0.0, 1.0, 2.0, 1.0, 0.5]
}

fn cg() -> MatrixFree {
    MatrixFree::new(ConjugateGradient::default())
}

fn diffusion(policy: Policy, kappa: f64) -> Heat {
    models::heat(policy, initial(), kappa, 4, &cg(), Rc::new(Diffusion { size: 5 })).unwrap()
}

#[test]
fn linear_combination_derivative_is_its_weight() {
    for declare_b_first in [false, true] {
        let mut tape = Tape::default();
        let (a, b) = if declare_b_first {
            let b = tape.register_initial_condition("b", array![4.0]).unwrap();
            let a = tape.register_initial_condition("a", array![-1.0]).unwrap();
            (a, b)
        } else {
            let a = tape.register_initial_condition("a", array![-1.0]).unwrap();
            let b = tape.register_initial_condition("b", array![4.0]).unwrap();
            (a, b)
        };
        tape.assign("y", LinearCombination::new([(a.clone(), 2.0), (b.clone(), 3.0)]))
            .unwrap();

        let gradient = tape
            .compute_gradient_unobserved(&Total::new("y"), &[a.clone(), b.clone()])
            .unwrap();
        assert_eq!(gradient.get(&a), Some(&array![2.0]));
        assert_eq!(gradient.get(&b), Some(&array![3.0]));
    }
}

#[test]
fn storage_policies_give_the_same_gradient() {
    let functional = FinalFunctional::new("u");
    let gradient = |policy| {
        let Heat {
            mut tape,
            u0,
            kappa,
        } = diffusion(policy, 0.5);
        let gradient = tape
            .compute_gradient_unobserved(&functional, &[u0.clone(), kappa.clone()])
            .unwrap();
        (
            gradient.get(&u0).cloned().unwrap(),
            gradient.get(&kappa).cloned().unwrap(),
        )
    };

    let (all_u0, all_kappa) = gradient(Policy::StoreAll);
    let (some_u0, some_kappa) = gradient(Policy::StoreControlsOnly);
    assert_relative_eq!(all_u0, some_u0, max_relative = 1e-12);
    assert_relative_eq!(all_kappa, some_kappa, max_relative = 1e-12);
}

#[test]
fn taylor_test_converges_at_second_order() {
    let Heat {
        mut tape,
        u0,
        kappa,
    } = diffusion(Policy::StoreControlsOnly, 0.5);

    let mut reduced = ReducedFunctional::new(&mut tape, FinalFunctional::new("u"), vec![u0, kappa]).unwrap();

    let only_u0 = reduced
        .taylor_test(&[array![0.3, -0.1, 0.2, 0.5, -0.4], array![0.0]], &TaylorConfig::default())
        .unwrap();
    assert!(only_u0.min_order().is_none_or(|order| order > 1.9));

    let only_kappa = reduced
        .taylor_test(&[Vector::zeros(5), array![0.2]], &TaylorConfig::default())
        .unwrap();
    assert!(only_kappa.min_order().unwrap() > 1.9);
}

#[test]
fn gradient_matches_centered_difference() {
    let functional = TimeIntegral::new("u").with_weight(2.0);
    let value_at = |kappa: f64| {
        let Heat { mut tape, .. } = diffusion(Policy::StoreAll, kappa);
        tape.evaluate_functional(&functional).unwrap()
    };

    let Heat {
        mut tape, kappa, ..
    } = diffusion(Policy::StoreControlsOnly, 0.5);
    let gradient = tape
        .compute_gradient_unobserved(&functional, &[kappa.clone()])
        .unwrap();

    let h = 1e-5;
    let fd = (value_at(0.5 + h) - value_at(0.5 - h)) / (2.0 * h);
    assert_relative_eq!(gradient.get(&kappa).unwrap()[0], fd, max_relative = 1e-6);
}

#[test]
fn tangent_agrees_with_gradient() {
    let functional = FinalFunctional::new("u").with_reference(array![0.2, 0.2, 0.2, 0.2, 0.2]);
    let direction = array![1.0, 0.0, -1.0, 0.5, 0.25];

    let Heat { mut tape, u0, .. } = diffusion(Policy::StoreControlsOnly, 0.3);
    let tangent = tape
        .compute_tangent(&functional, &[(u0.clone(), direction.clone())])
        .unwrap();
    let gradient = tape
        .compute_gradient_unobserved(&functional, &[u0.clone()])
        .unwrap();

    assert_relative_eq!(
        tangent,
        vector::inner(gradient.get(&u0).unwrap(), &direction).unwrap(),
        max_relative = 1e-10
    );
}

#[test]
fn nonsymmetric_solve_uses_transposed_operator() {
    let solver = MatrixFree::new(BiCgStab::default());
    let operator = Rc::new(Advection {
        size: 5,
        velocity: 0.8,
    });
    let Heat {
        mut tape,
        u0,
        kappa,
    } = models::heat(Policy::StoreControlsOnly, initial(), 0.4, 3, &solver, operator).unwrap();

    let mut reduced = ReducedFunctional::new(&mut tape, FinalFunctional::new("u"), vec![u0, kappa]).unwrap();
    let report = reduced
        .taylor_test(&[array![0.1, 0.2, -0.3, 0.0, 0.4], array![0.1]], &TaylorConfig::default())
        .unwrap();
    assert!(report.min_order().unwrap() > 1.9);
}

#[test]
fn preconditioned_solves_match_plain_ones() {
    let preconditioned = MatrixFree::new(ConjugateGradient::default()).with_preconditioner(Jacobi {
        size: 5,
        diagonal: 2.0,
    });
    let operator = Rc::new(Diffusion { size: 5 });
    let Heat {
        mut tape,
        u0,
        kappa,
    } = models::heat(Policy::StoreAll, initial(), 0.5, 4, &preconditioned, operator).unwrap();
    let with = tape
        .compute_gradient_unobserved(&FinalFunctional::new("u"), &[u0.clone(), kappa.clone()])
        .unwrap();

    let Heat {
        tape: mut plain, ..
    } = diffusion(Policy::StoreAll, 0.5);
    let without = plain
        .compute_gradient_unobserved(&FinalFunctional::new("u"), &[u0.clone(), kappa.clone()])
        .unwrap();

    assert_relative_eq!(with.get(&u0).unwrap(), without.get(&u0).unwrap(), max_relative = 1e-9);
    assert_relative_eq!(with.get(&kappa).unwrap(), without.get(&kappa).unwrap(), max_relative = 1e-9);
}

#[test]
fn summed_point_functionals_seed_each_instant() {
    // x1 = 2 x0 during one timestep, J = ½ x0² + ½ x1², dJ/dx0 = 5 x0.
    let mut tape = Tape::new(Policy::StoreControlsOnly);
    let x0 = tape.register_initial_condition("x", array![1.5]).unwrap();
    tape.assign("x", LinearCombination::new([(x0.clone(), 2.0)]))
        .unwrap();
    tape.increment_timestep(1.0, true).unwrap();

    let functional = FunctionalSum::new()
        .with_term(PointFunctional::new("x", Instant::Start))
        .with_term(PointFunctional::new("x", Instant::Time(1.0)));
    let gradient = tape
        .compute_gradient_unobserved(&functional, &[x0.clone()])
        .unwrap();
    assert_relative_eq!(gradient.get(&x0).unwrap()[0], 7.5, max_relative = 1e-12);
    assert_relative_eq!(tape.evaluate_functional(&functional).unwrap(), 5.625, max_relative = 1e-12);
}

#[test]
fn sliced_integral_gradient_matches_centered_difference() {
    let slice = TimeSlice::new(Some(0.15), None).unwrap();
    let functional = TimeIntegral::new("u").over(slice);
    let value_at = |kappa: f64| {
        let Heat { mut tape, .. } = diffusion(Policy::StoreAll, kappa);
        tape.evaluate_functional(&functional).unwrap()
    };

    let Heat {
        mut tape, kappa, ..
    } = diffusion(Policy::StoreControlsOnly, 0.5);
    let gradient = tape
        .compute_gradient_unobserved(&functional, &[kappa.clone()])
        .unwrap();

    let h = 1e-5;
    let fd = (value_at(0.5 + h) - value_at(0.5 - h)) / (2.0 * h);
    assert_relative_eq!(gradient.get(&kappa).unwrap()[0], fd, max_relative = 1e-6);
}
