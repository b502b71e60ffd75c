use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    model::{hypernetwork::HyperNetwork, unet::Unet},
    tensor::Tensor,
    utils::error::{HyperUnetError, Result},
};

/// Thread-safe handle to one [`Unet`].
///
/// Forward calls share a read lock for their whole duration; parameter
/// updates take the write lock, so no update interleaves with a forward pass.
#[derive(Clone)]
pub struct SharedUnet {
    inner: Arc<RwLock<Unet>>,
}

impl SharedUnet {
    pub fn new(unet: Unet) -> Self {
        Self {
            inner: Arc::new(RwLock::new(unet)),
        }
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, Unet>> {
        self.inner
            .read()
            .map_err(|e| HyperUnetError::Concurrency(format!("Unet read lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Unet>> {
        self.inner
            .write()
            .map_err(|e| HyperUnetError::Concurrency(format!("Unet write lock poisoned: {}", e)))
    }

    pub fn forward(
        &self,
        zf: &Tensor,
        measurement: Option<&Tensor>,
        hyperparams: &Tensor,
    ) -> Result<Tensor> {
        self.read()?.forward(zf, measurement, hyperparams)
    }

    /// Run `f` with exclusive access to the hypernetwork's parameters.
    pub fn update<T>(&self, f: impl FnOnce(&mut HyperNetwork) -> T) -> Result<T> {
        let mut guard = self.write()?;
        Ok(f(guard.hypernetwork_mut()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compute::device::Device, model::config::UnetConfig};
    use std::thread;

    fn shared() -> SharedUnet {
        let config = UnetConfig {
            nh: 2,
            seed: Some(1),
            residual: false,
            ..Default::default()
        };
        SharedUnet::new(Unet::new(Device::cpu_with_limit(None), config).unwrap())
    }

    #[test]
    fn concurrent_forwards_agree() {
        let net = shared();
        let zf = Tensor::from_fn(vec![1, 8, 8, 2], |i| (i % 5) as f32 * 0.1);
        let hp = Tensor::new(vec![1, 1], vec![0.3]).unwrap();
        let expected = net.forward(&zf, None, &hp).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let net = net.clone();
                let zf = zf.clone();
                let hp = hp.clone();
                thread::spawn(move || net.forward(&zf, None, &hp).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[test]
    fn update_changes_generated_weights() {
        let net = shared();
        let zf = Tensor::from_fn(vec![1, 8, 8, 2], |i| (i % 3) as f32);
        let hp = Tensor::new(vec![1, 1], vec![0.3]).unwrap();

        // zero every hypernetwork parameter: all generated kernels become tanh(0) = 0
        net.update(|hnet| {
            for stage in hnet.stages_mut() {
                let (w, b) = stage.parameters_mut();
                w.data_mut().fill(0.0);
                b.data_mut().fill(0.0);
            }
        })
        .unwrap();

        let out = net.forward(&zf, None, &hp).unwrap();
        assert!(out.data().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn misshapen_update_fails_the_next_forward() {
        let net = shared();
        let zf = Tensor::zeros(vec![1, 8, 8, 2]);
        let hp = Tensor::new(vec![1, 1], vec![0.3]).unwrap();

        net.update(|hnet| *hnet.stages_mut()[2].parameters_mut().0 = Tensor::zeros(vec![1]))
            .unwrap();

        match net.forward(&zf, None, &hp) {
            Err(HyperUnetError::ShapeMismatch { context, .. }) => {
                assert_eq!(context, "hypernetwork lin_out: linear layer weights")
            }
            other => panic!("expected shape mismatch, got {:?}", other),
        }
        // the lock is not poisoned by the failed call
        assert!(net.read().is_ok());
    }
}
