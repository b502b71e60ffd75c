use approx::assert_abs_diff_eq;
use hyperunet::{
    ArchitecturePlanner, ConvRouting, Device, HyperUnetError, SharedUnet, Tensor, Unet,
    UnetConfig, WeightSlicer,
};

fn small_config(residual: bool) -> UnetConfig {
    UnetConfig {
        num_hyperparams: 1,
        nh: 4,
        residual,
        seed: Some(2024),
        ..Default::default()
    }
}

fn feature_map(batch: usize, h: usize, w: usize) -> Tensor {
    Tensor::from_fn(vec![batch, h, w, 2], |i| ((i as f32) * 0.013).sin())
}

#[test]
fn reconstructs_sixteen_by_sixteen_input() {
    let net = Unet::new(Device::cpu_with_limit(None), small_config(true)).unwrap();
    let zf = feature_map(1, 16, 16);

    for value in [0.5, -1.0, 0.0, 1.0] {
        let hp = Tensor::new(vec![1, 1], vec![value]).unwrap();
        let out = net.forward(&zf, None, &hp).unwrap();
        assert_eq!(out.dims(), &[1, 16, 16, 2]);
        assert!(out.is_finite(), "non-finite output for hyperparameter {}", value);
    }
}

#[test]
fn same_seed_gives_same_output() {
    let zf = feature_map(2, 8, 16);
    let hp = Tensor::new(vec![2, 1], vec![0.2, 0.8]).unwrap();

    let a = Unet::new(Device::cpu_with_limit(None), small_config(true)).unwrap();
    let b = Unet::new(Device::cpu_with_limit(None), small_config(true)).unwrap();
    assert_eq!(
        a.forward(&zf, None, &hp).unwrap(),
        b.forward(&zf, None, &hp).unwrap()
    );
}

#[test]
fn residual_difference_is_the_input() {
    let zf = feature_map(2, 16, 8);
    let hp = Tensor::new(vec![2, 1], vec![-0.4, 0.6]).unwrap();

    let residual = Unet::new(Device::cpu_with_limit(None), small_config(true)).unwrap();
    let plain = Unet::new(Device::cpu_with_limit(None), small_config(false)).unwrap();

    let with = residual.forward(&zf, None, &hp).unwrap();
    let without = plain.forward(&zf, None, &hp).unwrap();

    for ((r, n), x) in with.data().iter().zip(without.data()).zip(zf.data()) {
        assert_abs_diff_eq!(r - n, *x, epsilon = 1e-5);
    }
}

#[test]
fn hyperparameters_change_the_reconstruction() {
    let net = Unet::new(Device::cpu_with_limit(None), small_config(false)).unwrap();
    let zf = feature_map(1, 8, 8);
    let low = net
        .forward(&zf, None, &Tensor::new(vec![1, 1], vec![-1.0]).unwrap())
        .unwrap();
    let high = net
        .forward(&zf, None, &Tensor::new(vec![1, 1], vec![1.0]).unwrap())
        .unwrap();
    assert_ne!(low, high);
}

#[test]
fn hypernetwork_output_slices_back_exactly() {
    let net = Unet::new(Device::cpu_with_limit(None), small_config(true)).unwrap();
    let hp = Tensor::new(vec![3, 1], vec![-1.0, 0.0, 1.0]).unwrap();
    let buffer = net.hypernetwork().forward(&hp).unwrap();

    assert_eq!(buffer.dims(), &[3, net.plan().out_dim()]);
    let layers = WeightSlicer::slice(&buffer, net.plan()).unwrap();
    assert_eq!(WeightSlicer::flatten(&layers).unwrap(), buffer);
}

#[test]
fn mismatched_planner_and_buffer_are_reported() {
    let plan = ArchitecturePlanner::plan(8).unwrap();
    let net = Unet::new(Device::cpu_with_limit(None), small_config(true)).unwrap();
    let buffer = net
        .hypernetwork()
        .forward(&Tensor::new(vec![1, 1], vec![0.0]).unwrap())
        .unwrap();

    match WeightSlicer::slice(&buffer, &plan) {
        Err(HyperUnetError::ShapeMismatch { expected, actual, .. }) => {
            assert!(expected.contains(&plan.out_dim().to_string()));
            assert!(actual.contains(&net.plan().out_dim().to_string()));
        }
        other => panic!("expected shape mismatch, got {:?}", other.map(|l| l.len())),
    }
}

#[test]
fn shared_handle_with_loop_routing() {
    let config = UnetConfig {
        routing: ConvRouting::PerSampleLoop,
        ..small_config(true)
    };
    let shared = SharedUnet::new(Unet::new(Device::cpu_with_limit(None), config).unwrap());
    let direct = Unet::new(Device::cpu_with_limit(None), small_config(true)).unwrap();

    let zf = feature_map(2, 8, 8);
    let hp = Tensor::new(vec![2, 1], vec![0.5, -0.5]).unwrap();
    assert_eq!(
        shared.forward(&zf, None, &hp).unwrap(),
        direct.forward(&zf, None, &hp).unwrap()
    );
}
