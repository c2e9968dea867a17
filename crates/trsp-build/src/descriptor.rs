use trsp_core::{
    Descriptor, EnsembleEngine, Engine, FormattedValue, InstanceKind, InstancePlacement,
    ModelConfig, Substitutions, TensorSet, TensorSpec, Value,
};

/// Assembles the model configuration for `model` from its resolved tensors.
pub fn model_descriptor(model: &ModelConfig, tensors: &TensorSet) -> Descriptor {
    let kind = model.kind();
    let mut descriptor = Descriptor::new().with("name", model.name.as_str());
    if let Engine::Ensemble(_) = model.engine {
        descriptor.insert("platform", "ensemble");
    }
    descriptor
        .insert("backend", kind.backend())
        .insert("max_batch_size", model.max_batch_size);

    let dims = model.dynamic_batching.then(Substitutions::dynamic_dims);
    descriptor
        .insert("input", tensor_list(&tensors.input, dims.as_ref()))
        .insert("output", tensor_list(&tensors.output, dims.as_ref()));

    if model.dynamic_batching {
        let mut batching = Descriptor::new();
        if let Some(delay) = model.max_queue_delay_microseconds {
            batching.insert(
                "max_queue_delay_microseconds",
                i64::try_from(delay).unwrap_or(i64::MAX),
            );
        }
        descriptor.insert("dynamic_batching", batching);
    }

    if let Some(group) = &model.instance_group {
        let entries: Vec<Descriptor> = group.iter().map(instance).collect();
        descriptor.insert("instance_group", entries);
    }

    if let Engine::Ensemble(ensemble) = &model.engine {
        descriptor.insert("ensemble_scheduling", scheduling(ensemble));
    }
    descriptor
}

fn tensor_list(tensors: &[TensorSpec], dims: Option<&Substitutions>) -> Vec<Descriptor> {
    tensors
        .iter()
        .map(|tensor| {
            let mut formatted = FormattedValue::sequence(&tensor.dims);
            if let Some(table) = dims {
                formatted = formatted.with_substitutions(table.clone());
            }
            Descriptor::new()
                .with("name", tensor.name.as_str())
                .with("data_type", FormattedValue::scalar(tensor.dtype.triton_token()))
                .with("dims", formatted)
        })
        .collect()
}

fn instance(placement: &InstancePlacement) -> Descriptor {
    let mut entry =
        Descriptor::new().with("kind", FormattedValue::scalar(placement.kind.triton_token()));
    if placement.kind == InstanceKind::Gpu {
        if let Some(count) = placement.count {
            entry.insert("count", count);
        }
    }
    if let Some(gpus) = &placement.gpus {
        entry.insert("gpus", FormattedValue::sequence(gpus));
    }
    entry
}

fn scheduling(ensemble: &EnsembleEngine) -> Descriptor {
    let steps: Vec<Descriptor> = ensemble
        .steps
        .iter()
        .map(|step| {
            let mut entry = Descriptor::new()
                .with("model_name", step.model.as_str())
                .with("model_version", step.version.model_version());
            for (key, map) in [("input_map", &step.input_map), ("output_map", &step.output_map)] {
                if map.is_empty() {
                    continue;
                }
                let pairs: Vec<Descriptor> = map
                    .iter()
                    .map(|(k, v)| Descriptor::new().with("key", k.as_str()).with("value", v.as_str()))
                    .collect();
                entry.insert(key, pairs);
            }
            entry
        })
        .collect();
    Descriptor::new().with("step", Value::from(steps))
}
