//! Integration tests for seeded, repeatable training runs
//!
//! Kept to a single test so the global torch seed is not shared between
//! concurrently running tests.

use lcgan_hyperspectral::{
    model::{DiscriminatorConfig, GeneratorConfig, Lcgan},
    training::{BatchSize, StepMetrics, Trainer, TrainingConfig},
};
use tch::{Device, Kind, Tensor};

const SEED: u64 = 7;

fn run(steps: usize) -> (Vec<StepMetrics>, Tensor, Tensor) {
    tch::manual_seed(SEED as i64);

    let gen_config = GeneratorConfig {
        latent_dim: 8,
        num_classes: 3,
        bands: 4,
        in_channels: vec![16, 16],
        out_channels: vec![16, 8],
        ..Default::default()
    };
    let dis_config = DiscriminatorConfig {
        num_classes: 3,
        in_channels: vec![4, 16],
        out_channels: vec![16, 32],
        downsample: vec![true, true],
        ..Default::default()
    };
    let model = Lcgan::new(gen_config, dis_config, Device::Cpu).unwrap();

    let config = TrainingConfig {
        seed: SEED,
        batch_size: BatchSize { gen: 2, dis: 4 },
        ..Default::default()
    };
    let mut trainer = Trainer::new(model, config).unwrap();

    let images = Tensor::linspace(-1.0, 1.0, 4 * 4 * 16 * 16, (Kind::Float, Device::Cpu))
        .view([4, 4, 16, 16]);
    let labels = Tensor::from_slice(&[0i64, 1, 2, 0]);

    let history = (0..steps)
        .map(|itr| trainer.train_step(&images, &labels, itr).unwrap())
        .collect();

    (
        history,
        trainer.latent_sampler().current().copy(),
        trainer.label_sampler().current().copy(),
    )
}

#[test]
fn test_identical_seeds_give_identical_runs() {
    tch::set_num_threads(1);

    let (first, z_first, y_first) = run(3);
    let (second, z_second, y_second) = run(3);

    assert!(z_first.equal(&z_second));
    assert!(y_first.equal(&y_second));

    for (a, b) in first.iter().zip(&second) {
        assert!(a.is_finite());
        assert_eq!(a.gen_loss, b.gen_loss);
        assert_eq!(a.dis_loss_real, b.dis_loss_real);
        assert_eq!(a.dis_loss_fake, b.dis_loss_fake);
    }
}
