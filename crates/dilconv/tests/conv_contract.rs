use dilconv::core::{Tensor, Tolerance};
use dilconv::nn::{reference, Conv2dConfig, ConvError, DilatedConv2d, GradCheck};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_output_shape_follows_floor_formula() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(21);
    for (k, s, p, d) in [(3, 1, 0, 1), (3, 2, 1, 1), (2, 1, 1, 2), (3, 3, 2, 2), (1, 2, 0, 3)] {
        let cfg = Conv2dConfig::dilated(2, 3, k, k, s, s, p, p, d, d);
        let layer: DilatedConv2d<f64> = DilatedConv2d::new(cfg, &mut rng).unwrap();
        let input = Tensor::randn(vec![2, 2, 9, 8], &mut rng);
        let out = layer.forward(&input).unwrap();
        let oh = (9 + 2 * p - d * (k - 1) - 1) / s + 1;
        let ow = (8 + 2 * p - d * (k - 1) - 1) / s + 1;
        assert_eq!(out.shape_vec(), vec![2, 3, oh, ow], "{layer}");
    }
}

#[test]
fn test_padded_standard_convolution_on_6x6() {
    let mut rng = StdRng::seed_from_u64(22);
    let layer: DilatedConv2d<f64> =
        DilatedConv2d::new(Conv2dConfig::spatial(3, 2, 3, 3, 1, 1, 2, 2), &mut rng).unwrap();
    let out = layer.forward(&Tensor::randn(vec![3, 6, 6], &mut rng)).unwrap();
    assert_eq!(out.shape_vec(), vec![2, 8, 8]);
}

#[test]
fn test_strided_convolution_on_6x6() {
    let mut rng = StdRng::seed_from_u64(23);
    let layer: DilatedConv2d<f64> =
        DilatedConv2d::new(Conv2dConfig::spatial(3, 2, 3, 3, 2, 2, 1, 1), &mut rng).unwrap();
    let out = layer.forward(&Tensor::randn(vec![3, 6, 6], &mut rng)).unwrap();
    assert_eq!(out.shape_vec(), vec![2, 3, 3]);
}

#[test]
fn test_batched_forward_matches_samples() {
    let mut rng = StdRng::seed_from_u64(24);
    let layer: DilatedConv2d<f64> =
        DilatedConv2d::new(Conv2dConfig::dilated(3, 4, 3, 3, 1, 1, 2, 2, 2, 2), &mut rng).unwrap();
    let samples: Vec<Tensor<f64>> =
        (0..4).map(|_| Tensor::randn(vec![3, 6, 6], &mut rng)).collect();
    let batch = Tensor::stack(&samples.iter().collect::<Vec<_>>()).unwrap();

    let batched = layer.forward(&batch).unwrap();
    for (i, sample) in samples.iter().enumerate() {
        assert_eq!(layer.forward(sample).unwrap(), batched.select(i).unwrap());
    }
}

#[test]
fn test_repeated_backward_is_bit_identical() {
    let mut rng = StdRng::seed_from_u64(25);
    let mut layer: DilatedConv2d<f64> =
        DilatedConv2d::new(Conv2dConfig::dilated(3, 5, 3, 3, 1, 1, 2, 2, 2, 2), &mut rng).unwrap();
    let input = Tensor::randn(vec![2, 3, 6, 6], &mut rng);
    let grad_output = Tensor::randn(layer.output_shape(input.dims()).unwrap(), &mut rng);

    let mut runs = Vec::new();
    for _ in 0..2 {
        layer.zero_grad();
        layer.forward(&input).unwrap();
        let grad_input = layer.backward(&input, &grad_output).unwrap();
        runs.push((grad_input, layer.grad_weight().clone(), layer.grad_bias().cloned()));
    }
    assert_eq!(runs[0], runs[1]);
}

#[test]
fn test_im2col_agrees_with_reference_and_finite_differences() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(26);
    let cfg = Conv2dConfig::dilated(2, 3, 3, 2, 2, 1, 1, 1, 1, 2);
    let mut layer: DilatedConv2d<f64> = DilatedConv2d::new(cfg, &mut rng).unwrap();
    let input = Tensor::randn(vec![2, 2, 7, 7], &mut rng);

    let report = GradCheck::default().run(&layer, &input, &mut rng).unwrap();
    assert!(report.passed(), "{report:?}");

    let grad_output = Tensor::randn(layer.output_shape(input.dims()).unwrap(), &mut rng);
    let grad_input = layer.backward(&input, &grad_output).unwrap();
    let direct = reference::conv2d_backward(&cfg, layer.weight(), &input, &grad_output).unwrap();
    let tol = Tolerance::default();
    assert!(grad_input.allclose(&direct.input, tol).unwrap());
    assert!(layer.grad_weight().allclose(&direct.weight, tol).unwrap());
    assert!(layer.grad_bias().unwrap().allclose(&direct.bias, tol).unwrap());
}

#[test]
fn test_nan_propagates() {
    let mut rng = StdRng::seed_from_u64(27);
    let layer: DilatedConv2d<f64> =
        DilatedConv2d::new(Conv2dConfig::new(1, 1, [2, 2]), &mut rng).unwrap();
    let mut input = Tensor::zeros(vec![1, 3, 3]);
    input.set(&[0, 0, 0], f64::NAN).unwrap();
    let out = layer.forward(&input).unwrap();
    assert!(out.has_nan());
    assert!(out.get(&[0, 0, 0]).unwrap().is_nan());
    assert!(!out.get(&[0, 1, 1]).unwrap().is_nan());
}

#[test]
fn test_configuration_errors_are_reported() {
    let mut rng = StdRng::seed_from_u64(28);
    let cfg = Conv2dConfig::new(3, 2, [3, 3]).with_dilation([2, 2]);
    let layer: DilatedConv2d<f64> = DilatedConv2d::new(cfg, &mut rng).unwrap();
    assert!(matches!(
        layer.forward(&Tensor::zeros(vec![2, 6, 6])),
        Err(ConvError::ChannelMismatch { expected: 3, got: 2 })
    ));
    assert!(matches!(
        layer.forward(&Tensor::zeros(vec![3, 4, 5])),
        Err(ConvError::InputTooSmall { .. })
    ));
}
