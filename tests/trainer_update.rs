//! Tests for the update pipeline shared by every trainer.

use ndarray::{arr1, ArrayD, IxDyn};
use rtrainer::prelude::*;

const TOL: f32 = 1e-6;

fn param(values: &[f32]) -> Parameter {
    Parameter::from_vec(&[values.len()], values.to_vec()).unwrap()
}

fn grad(values: &[f32]) -> ArrayD<f32> {
    arr1(values).into_dyn()
}

fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() <= tol, "expected {:?}, got {:?}", expected, actual);
    }
}

fn values(p: &Parameter) -> Vec<f32> {
    p.value().iter().copied().collect()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_update_without_parameters_fails() {
    let mut trainer = Trainer::new(SGD::default());
    assert!(matches!(
        trainer.update(),
        Err(TrainerError::NoParametersRegistered)
    ));
    assert_eq!(trainer.epoch(), 0);
}

#[test]
fn test_epoch_advances_by_one_per_update() {
    let mut trainer = Trainer::new(Adam::default());
    let p = param(&[1.0, 2.0]);
    trainer.add_parameter(&p).unwrap();
    trainer.set_epoch(41);
    p.reset_gradient();
    trainer.update().unwrap();
    assert_eq!(trainer.epoch(), 42);
    trainer.update().unwrap();
    assert_eq!(trainer.get_uint_config("Trainer.epoch"), Some(43));
}

#[test]
fn test_parameter_without_gradient_is_skipped() {
    let mut trainer = Trainer::new(SGD::new(1.0));
    let with_grad = param(&[1.0]);
    let without_grad = param(&[1.0]);
    trainer.add_parameters([&with_grad, &without_grad]).unwrap();
    with_grad.set_gradient(grad(&[0.5])).unwrap();

    trainer.update().unwrap();
    assert_close(&values(&with_grad), &[0.5], TOL);
    assert_eq!(values(&without_grad), vec![1.0]);
    assert_eq!(trainer.epoch(), 1);
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let mut trainer = Trainer::new(SGD::default());
    let p = param(&[1.0]);
    let id = trainer.add_parameter(&p).unwrap();
    match trainer.add_parameter(&p.clone()) {
        Err(TrainerError::DuplicateParameter(existing)) => assert_eq!(existing, id),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(trainer.num_parameters(), 1);
}

#[test]
fn test_removed_parameter_is_no_longer_updated() {
    let mut trainer = Trainer::new(SGD::new(1.0));
    let kept = param(&[0.0]);
    let removed = param(&[0.0]);
    let kept_id = trainer.add_parameter(&kept).unwrap();
    let removed_id = trainer.add_parameter(&removed).unwrap();
    let handle = trainer.remove_parameter(removed_id).unwrap();
    assert!(handle.same_parameter(&removed));
    assert!(matches!(
        trainer.remove_parameter(removed_id),
        Err(TrainerError::UnknownParameter(_))
    ));

    kept.set_gradient(grad(&[1.0])).unwrap();
    removed.set_gradient(grad(&[1.0])).unwrap();
    trainer.update().unwrap();
    assert_eq!(values(&removed), vec![0.0]);
    assert_close(&values(&kept), &[-1.0], TOL);
    assert_eq!(trainer.parameter_ids(), vec![kept_id]);
}

#[test]
fn test_reset_gradients_zeroes_every_parameter() {
    let mut trainer = Trainer::new(SGD::default());
    let a = param(&[1.0, 2.0]);
    let b = param(&[3.0]);
    trainer.add_parameters([&a, &b]).unwrap();
    a.set_gradient(grad(&[5.0, 5.0])).unwrap();

    trainer.reset_gradients();
    assert_eq!(a.gradient().unwrap(), grad(&[0.0, 0.0]));
    assert_eq!(b.gradient().unwrap(), grad(&[0.0]));
}

// ============================================================================
// Update rules through the trainer
// ============================================================================

#[test]
fn test_sgd_update() {
    let mut trainer = Trainer::new(SGD::new(0.1));
    let p = param(&[1.0, -1.0]);
    trainer.add_parameter(&p).unwrap();
    p.set_gradient(grad(&[2.0, -4.0])).unwrap();
    trainer.update().unwrap();
    assert_close(&values(&p), &[0.8, -0.6], TOL);
}

#[test]
fn test_lr_scale_multiplies_step() {
    let mut trainer = Trainer::new(SGD::new(0.1));
    trainer.set_lr_scale(0.5).unwrap();
    let p = param(&[1.0]);
    trainer.add_parameter(&p).unwrap();
    p.set_gradient(grad(&[2.0])).unwrap();
    trainer.update().unwrap();
    assert_close(&values(&p), &[0.9], TOL);
}

#[test]
fn test_momentum_sgd_update() {
    let mut trainer = Trainer::new(MomentumSGD::new(0.1, 0.9));
    let p = param(&[0.0]);
    let id = trainer.add_parameter(&p).unwrap();
    p.set_gradient(grad(&[1.0])).unwrap();

    trainer.update().unwrap();
    assert_close(&values(&p), &[-0.1], TOL);
    trainer.update().unwrap();
    // m = 0.9 * -0.1 - 0.1 = -0.19
    assert_close(&values(&p), &[-0.29], TOL);
    assert_close(trainer.state(id).unwrap()[0].as_slice().unwrap(), &[-0.19], TOL);
}

#[test]
fn test_momentum_sgd_with_zero_eta_keeps_value() {
    let mut trainer = Trainer::new(MomentumSGD::new(0.0, 1.0));
    let p = param(&[3.0, 4.0]);
    trainer.add_parameter(&p).unwrap();
    p.set_gradient(grad(&[100.0, -100.0])).unwrap();
    trainer.update().unwrap();
    trainer.update().unwrap();
    assert_eq!(values(&p), vec![3.0, 4.0]);
}

#[test]
fn test_adagrad_update() {
    let mut trainer = Trainer::new(AdaGrad::new(0.1, 0.0));
    let p = param(&[1.0]);
    trainer.add_parameter(&p).unwrap();
    p.set_gradient(grad(&[2.0])).unwrap();

    trainer.update().unwrap();
    // s = 4, step = 0.1 * 2 / 2
    assert_close(&values(&p), &[0.9], TOL);
    trainer.update().unwrap();
    // s = 8, step = 0.1 * 2 / sqrt(8)
    let expected = 0.9 - 0.2 / 8f32.sqrt();
    assert_close(&values(&p), &[expected], TOL);
}

#[test]
fn test_rmsprop_update() {
    let mut trainer = Trainer::new(RMSProp::new(0.01, 0.9, 0.0));
    let p = param(&[1.0]);
    trainer.add_parameter(&p).unwrap();
    p.set_gradient(grad(&[2.0])).unwrap();
    trainer.update().unwrap();
    // s = 0.1 * 4 = 0.4
    let expected = 1.0 - 0.01 * 2.0 / 0.4f32.sqrt();
    assert_close(&values(&p), &[expected], TOL);
}

#[test]
fn test_adadelta_update() {
    let mut trainer = Trainer::new(AdaDelta::default());
    let p = param(&[0.0]);
    let id = trainer.add_parameter(&p).unwrap();
    p.set_gradient(grad(&[1.0])).unwrap();
    trainer.update().unwrap();

    let (rho, eps) = (0.95f64, 1e-6f64);
    let s = (1.0 - rho) * 1.0;
    let d = -(eps.sqrt()) / (s + eps).sqrt();
    let u = (1.0 - rho) * d * d;
    assert_close(&values(&p), &[d as f32], 1e-6);
    let state = trainer.state(id).unwrap();
    assert_close(state[0].as_slice().unwrap(), &[s as f32], 1e-6);
    assert_close(state[1].as_slice().unwrap(), &[u as f32], 1e-9);
}

#[test]
fn test_adam_first_step_moves_by_alpha() {
    let mut trainer = Trainer::new(Adam::new(0.01, 0.9, 0.999, 0.0));
    let p = param(&[1.0, 1.0]);
    trainer.add_parameter(&p).unwrap();
    p.set_gradient(grad(&[3.0, -0.5])).unwrap();
    trainer.update().unwrap();
    // Bias-corrected moments are g and g^2 after the first step.
    assert_close(&values(&p), &[0.99, 1.01], 1e-5);
}

#[test]
fn test_adam_with_zero_alpha_and_eps_keeps_value() {
    let mut trainer = Trainer::new(Adam::default());
    trainer
        .set_configs(
            &UintConfigs::from([("Trainer.epoch".to_string(), 1)]),
            &FloatConfigs::from([
                ("Adam.alpha".to_string(), 0.0),
                ("Adam.beta1".to_string(), 1.0),
                ("Adam.beta2".to_string(), 1.0),
                ("Adam.eps".to_string(), 0.0),
            ]),
        )
        .unwrap();
    let p = param(&[0.25, -7.0]);
    trainer.add_parameter(&p).unwrap();
    p.reset_gradient();
    trainer.update().unwrap();
    assert_eq!(values(&p), vec![0.25, -7.0]);
    assert_eq!(trainer.epoch(), 2);
}

// ============================================================================
// Regularization and clipping
// ============================================================================

#[test]
fn test_l2_strength_adds_weight_decay() {
    let mut trainer = Trainer::new(SGD::new(0.1));
    trainer.set_l2_strength(0.5).unwrap();
    let p = param(&[2.0]);
    trainer.add_parameter(&p).unwrap();
    p.reset_gradient();
    trainer.update().unwrap();
    // effective gradient = 0 + 0.5 * 2
    assert_close(&values(&p), &[1.9], TOL);
}

#[test]
fn test_zero_clip_threshold_disables_clipping() {
    let mut trainer = Trainer::new(SGD::new(1.0));
    let p = param(&[0.0]);
    trainer.add_parameter(&p).unwrap();
    p.set_gradient(grad(&[1000.0])).unwrap();
    trainer.update().unwrap();
    assert_close(&values(&p), &[-1000.0], TOL);
}

#[test]
fn test_clipping_uses_global_norm() {
    let mut trainer = Trainer::new(SGD::new(1.0));
    trainer.set_clip_threshold(1.0).unwrap();
    let a = param(&[0.0]);
    let b = param(&[0.0]);
    trainer.add_parameters([&a, &b]).unwrap();
    a.set_gradient(grad(&[3.0])).unwrap();
    b.set_gradient(grad(&[4.0])).unwrap();
    trainer.update().unwrap();
    assert_close(&values(&a), &[-0.6], TOL);
    assert_close(&values(&b), &[-0.8], TOL);
}

#[test]
fn test_gradients_below_threshold_are_untouched() {
    let mut trainer = Trainer::new(SGD::new(1.0));
    trainer.set_clip_threshold(10.0).unwrap();
    let p = param(&[0.0, 0.0]);
    trainer.add_parameter(&p).unwrap();
    p.set_gradient(grad(&[3.0, 4.0])).unwrap();
    trainer.update().unwrap();
    assert_close(&values(&p), &[-3.0, -4.0], TOL);
}

#[test]
fn test_caller_gradient_is_not_modified() {
    let mut trainer = Trainer::new(SGD::new(1.0));
    trainer.set_clip_threshold(0.1).unwrap();
    trainer.set_l2_strength(2.0).unwrap();
    let p = param(&[1.0, 1.0]);
    trainer.add_parameter(&p).unwrap();
    p.set_gradient(grad(&[3.0, 4.0])).unwrap();
    trainer.update().unwrap();
    assert_eq!(p.gradient().unwrap(), grad(&[3.0, 4.0]));
}

// ============================================================================
// Failure atomicity
// ============================================================================

#[test]
fn test_non_finite_gradient_leaves_trainer_unchanged() {
    let mut trainer = Trainer::new(Adam::default());
    let good = param(&[1.0]);
    let bad = param(&[1.0]);
    let good_id = trainer.add_parameter(&good).unwrap();
    trainer.add_parameter(&bad).unwrap();
    good.set_gradient(grad(&[0.5])).unwrap();
    bad.set_gradient(grad(&[f32::NAN])).unwrap();

    let err = trainer.update().unwrap_err();
    assert!(matches!(err, TrainerError::NumericDegenerate { .. }));
    assert_eq!(trainer.epoch(), 0);
    assert_eq!(values(&good), vec![1.0]);
    assert_eq!(values(&bad), vec![1.0]);
    assert!(trainer.state(good_id).is_none());
}

#[test]
fn test_overflowing_update_is_rejected() {
    let mut trainer = Trainer::new(SGD::new(1.0));
    let p = param(&[f32::MAX]);
    trainer.add_parameter(&p).unwrap();
    p.set_gradient(grad(&[-f32::MAX])).unwrap();
    assert!(matches!(
        trainer.update(),
        Err(TrainerError::NumericDegenerate { .. })
    ));
    assert_eq!(values(&p), vec![f32::MAX]);
    assert_eq!(trainer.epoch(), 0);
}

#[test]
fn test_matrix_parameters() {
    let mut trainer = Trainer::new(SGD::new(0.5));
    let p = Parameter::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    trainer.add_parameter(&p).unwrap();
    p.set_gradient(ArrayD::from_elem(IxDyn(&[2, 2]), 2.0)).unwrap();
    trainer.update().unwrap();
    assert_close(&values(&p), &[0.0, 1.0, 2.0, 3.0], TOL);
}

#[test]
fn test_overflowing_weight_decay_is_rejected() {
    let mut trainer = Trainer::new(Adam::new(0.0, 0.9, 0.999, 1e-8));
    trainer.set_l2_strength(1e39).unwrap();
    let p = param(&[1.0]);
    let id = trainer.add_parameter(&p).unwrap();
    p.reset_gradient();

    match trainer.update() {
        Err(TrainerError::NumericDegenerate { id: bad, what }) => {
            assert_eq!(bad, id);
            assert_eq!(what, "working gradient");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(trainer.epoch(), 0);
    assert!(trainer.state(id).is_none());
    assert_eq!(values(&p), vec![1.0]);
}

#[test]
fn test_non_finite_state_is_not_committed() {
    // A zero step size leaves the value alone, but g * g overflows the
    // second moment.
    let mut trainer = Trainer::new(Adam::new(0.0, 0.9, 0.999, 1e-8));
    let p = param(&[1.0]);
    let id = trainer.add_parameter(&p).unwrap();
    p.set_gradient(grad(&[f32::MAX])).unwrap();

    match trainer.update() {
        Err(TrainerError::NumericDegenerate { what, .. }) => assert_eq!(what, "updated state"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(trainer.epoch(), 0);
    assert!(trainer.state(id).is_none());

    // The trainer stays usable once the gradient is sane again.
    p.set_gradient(grad(&[0.5])).unwrap();
    trainer.set_float_config("Adam.alpha", 0.001).unwrap();
    trainer.update().unwrap();
    assert_eq!(trainer.epoch(), 1);
    assert!(trainer.state(id).unwrap().iter().all(|s| s.iter().all(|x| x.is_finite())));
}

#[test]
fn test_flat_list_training_loop() {
    let mut trainer = Trainer::new(SGD::new(0.5));
    let w = Parameter::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    trainer.add_parameter(&w).unwrap();

    trainer.reset_gradients();
    w.set_gradient_from_vec(vec![2.0, 0.0, -2.0, 4.0]).unwrap();
    trainer.update().unwrap();
    assert_close(&w.to_vec(), &[0.0, 2.0, 4.0, 2.0], TOL);

    assert!(matches!(
        w.set_gradient_from_vec(vec![1.0; 5]),
        Err(TrainerError::ShapeMismatch { .. })
    ));
}
