pub mod locked_inputs;
pub mod types;

pub use locked_inputs::{derive_locked_inputs, locked_input_template, reconcile_inputs};
pub use types::*;

/// Re-derives the locked inputs of `values` and reconciles its input list.
pub fn sync_locked_inputs(values: &BuilderFormValues) -> Vec<BuilderFormInput> {
    let locked = derive_locked_inputs(&values.global.authenticator, &values.streams);
    reconcile_inputs(&values.inputs, &locked)
}
