use std::rc::Rc;

use ndarray::array;
use rewind_core::{Block, Vector};
use rewind_solvers::krylov::BiCgStab;
use rewind_tape::{
    MatrixFree, Tape,
    blocks::LinearCombination,
    verify::{TaylorConfig, check_derivative, check_transpose},
};

use integration_tests::operators::Advection;

#[test]
fn krylov_block_passes_transpose_and_derivative_checks() {
    let mut tape = Tape::default();
    let b = tape.register_initial_condition("b", array![1.0, -0.5, 2.0, 0.0]).unwrap();
    let kappa = tape.register_initial_condition("kappa", array![0.3]).unwrap();

    let block = MatrixFree::new(BiCgStab::default())
        .block(
            &tape,
            Rc::new(Advection {
                size: 4,
                velocity: 1.2,
            }),
            vec![kappa.clone()],
            Box::new(LinearCombination::new([(b.clone(), 2.0)])),
        )
        .unwrap();

    let values: Vec<Vector> = block
        .dependencies()
        .iter()
        .map(|dep| tape.value(dep).unwrap())
        .collect();
    let refs: Vec<&Vector> = values.iter().collect();

    for variable in [&b, &kappa] {
        let check = check_transpose(&block, &refs, variable).unwrap();
        assert!(check.relative_error() < 1e-9, "{variable}: {check:?}");
    }

    let report = check_derivative(&block, &refs, &kappa, &array![1.0], &TaylorConfig::default()).unwrap();
    assert!(report.min_order().unwrap() > 1.9);

    // Linear in b, so the remainder vanishes up to solver tolerance.
    let report = check_derivative(
        &block,
        &refs,
        &b,
        &array![0.5, 0.5, -1.0, 1.0],
        &TaylorConfig::default(),
    )
    .unwrap();
    assert!(report.residuals.iter().all(|r| *r < 1e-9));
}
