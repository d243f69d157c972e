//! An L2 regularizer inside the optimizer must train exactly like an
//! unregularized optimizer fed `grad + c * weight` by hand.

use dilconv::core::Tensor;
use dilconv::nn::{Conv2dConfig, DilatedConv2d};
use dilconv::optim::{Optimizer, L2, SGD};
use rand::rngs::StdRng;
use rand::SeedableRng;

const STEPS: usize = 10;
const DECAY: f64 = 0.01;
const LR: f64 = 0.05;

struct Batch {
    input: Tensor<f64>,
    target: Tensor<f64>,
}

fn batches(cfg: &Conv2dConfig, input_shape: Vec<usize>, rng: &mut StdRng) -> Vec<Batch> {
    let out_shape = cfg.output_shape(&input_shape).unwrap();
    (0..STEPS)
        .map(|_| Batch {
            input: Tensor::randn(input_shape.clone(), rng),
            target: Tensor::randn(out_shape.clone(), rng),
        })
        .collect()
}

/// Half squared error; returns `dL/doutput`.
fn mse_grad(output: &Tensor<f64>, target: &Tensor<f64>) -> Tensor<f64> {
    output.sub(target).unwrap()
}

fn run_pair(cfg: Conv2dConfig, input_shape: Vec<usize>, seed: u64) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut regularized: DilatedConv2d<f64> = DilatedConv2d::new(cfg, &mut rng).unwrap();
    let mut manual = DilatedConv2d::from_state(regularized.state()).unwrap();
    let initial = regularized.weight().clone();
    let data = batches(&cfg, input_shape, &mut rng);

    let mut with_l2 = SGD::new(LR).unwrap().with_regularizer(L2::new(DECAY).unwrap());
    let mut plain = SGD::new(LR).unwrap();

    for batch in &data {
        regularized.zero_grad();
        let out = regularized.forward(&batch.input).unwrap();
        regularized.backward(&batch.input, &mse_grad(&out, &batch.target)).unwrap();
        with_l2.step(&mut regularized).unwrap();

        manual.zero_grad();
        let out = manual.forward(&batch.input).unwrap();
        manual.backward(&batch.input, &mse_grad(&out, &batch.target)).unwrap();
        let weight = manual.weight().clone();
        manual.grad_weight_mut().add_scaled(&weight, DECAY).unwrap();
        plain.step(&mut manual).unwrap();
    }

    assert_eq!(regularized.weight(), manual.weight());
    assert_eq!(regularized.bias(), manual.bias());
    assert_ne!(regularized.weight(), &initial);
}

#[test]
fn test_l2_matches_manual_decay_standard_conv() {
    run_pair(Conv2dConfig::spatial(3, 4, 3, 3, 1, 1, 2, 2), vec![3, 6, 6], 11);
}

#[test]
fn test_l2_matches_manual_decay_dilated_batched() {
    run_pair(Conv2dConfig::dilated(2, 3, 3, 3, 2, 1, 1, 1, 2, 2), vec![4, 2, 7, 7], 12);
}

#[test]
fn test_l2_matches_manual_decay_without_bias() {
    run_pair(Conv2dConfig::dilated(2, 2, 2, 3, 1, 1, 0, 1, 3, 1).without_bias(), vec![2, 5, 6], 13);
}

#[test]
fn test_l2_shrinks_weights_relative_to_plain_training() {
    let mut rng = StdRng::seed_from_u64(14);
    let cfg = Conv2dConfig::new(1, 1, [2, 2]).without_bias();
    let mut decayed: DilatedConv2d<f64> = DilatedConv2d::new(cfg, &mut rng).unwrap();
    let mut undecayed = decayed.clone();
    let mut with_l2 = SGD::new(0.1f64).unwrap().with_regularizer(L2::new(0.5).unwrap());
    let mut plain = SGD::new(0.1f64).unwrap();

    // A zero gradient isolates the decay term: w <- (1 - lr * c) * w.
    let input = Tensor::zeros(vec![1, 3, 3]);
    let grad_output = Tensor::zeros(vec![1, 2, 2]);
    for _ in 0..5 {
        for (layer, opt) in [(&mut decayed, &mut with_l2), (&mut undecayed, &mut plain)] {
            layer.zero_grad();
            layer.backward(&input, &grad_output).unwrap();
            opt.step(layer).unwrap();
        }
    }

    let shrink = 0.95f64.powi(5);
    for (d, u) in decayed.weight().data().iter().zip(undecayed.weight().data()) {
        approx::assert_relative_eq!(*d, u * shrink, max_relative = 1e-12);
    }
}
