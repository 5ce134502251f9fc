//! Emits build/target metadata consumed by `rig_supervisor::build_info`.

fn main() {
    use vergen::{BuildBuilder, CargoBuilder, Emitter};

    let mut emitter = Emitter::default();
    if let Ok(build) = BuildBuilder::all_build() {
        let _ = emitter.add_instructions(&build);
    }
    if let Ok(cargo) = CargoBuilder::all_cargo() {
        let _ = emitter.add_instructions(&cargo);
    }

    // Missing instructions degrade to "unknown" at runtime; never fail the build.
    if let Err(err) = emitter.emit() {
        eprintln!("vergen emit skipped: {err}");
    }
}
