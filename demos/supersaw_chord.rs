/// Plays a C minor chord on a supersaw instrument, then lets the offline host
/// run until every voice has finished and been collected.
///
/// Run with: RUST_LOG=debug cargo run --example supersaw_chord
use tony_graph::{host::offline::OfflineHost, settings, voices, AudioHost, GraphContext};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let mut ctx = GraphContext::new(OfflineHost::default());
    let bus = ctx.create_dynamics_compressor(settings! { "threshold" => -12.0 })?;
    let dest = ctx.destination();
    ctx.connect(bus, dest)?;

    let saw = ctx.create_instrument(
        voices::supersaw,
        settings! {
            "duration" => 1.5,
            "width" => 0.6,
            "gain" => 0.25,
        },
        Some(bus.into()),
    );

    println!("=== Supersaw chord ===\n");
    for (i, note) in ["C3", "Eb3", "G3", "C4"].into_iter().enumerate() {
        let when = 0.5 + i as f64 * 0.05;
        let voice = saw.play(&mut ctx, note, Some(when))?;
        let frequency = ctx.param(voice, "frequency")?;
        println!(
            "  {note:<3} at {when:.2}s  {:.2} Hz  {} host nodes",
            ctx.host().param_value(frequency.key())?,
            ctx.host().node_count()
        );
    }

    let mut t = 0.5;
    while ctx.host().node_count() > 1 && t < 5.0 {
        t += 0.25;
        ctx.host_mut().advance_to(t);
        ctx.process_events()?;
        let freed = ctx.collect()?;
        if freed > 0 {
            println!("  t={t:.2}s  collected {freed} nodes");
        }
    }
    println!("\n{} host nodes left", ctx.host().node_count());
    Ok(())
}
