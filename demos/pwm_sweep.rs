/// Sweeps the pulse width of a PWM oscillator and prints the automation the
/// host was asked to perform.
///
/// Run with: RUST_LOG=debug cargo run --example pwm_sweep
use tony_graph::{envelope, host::offline::OfflineHost, settings, GraphContext};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let mut ctx = GraphContext::new(OfflineHost::default());
    let dest = ctx.destination();

    let pwm = ctx.create_pwm_oscillator(settings! {
        "frequency" => 110.0,
        "gain" => envelope![0.0, (0.6, 0.02), (0.0, 3.9)],
    })?;
    ctx.node(pwm)
        .connect(dest)?
        .param("width")?
        .apply(&envelope![0.1, (0.9, 2.0), (0.1, 2.0)], Some(0.0))?;
    ctx.play(pwm, Some(4.0), None)?;

    let width = ctx.param(pwm, "width")?;
    let timeline = ctx
        .host()
        .timeline(width.key())
        .ok_or_else(|| color_eyre::eyre::eyre!("width has no automation"))?;

    println!("=== PWM sweep ===\n");
    for tenth in 0..=40 {
        let t = tenth as f64 * 0.1;
        if tenth % 5 == 0 {
            println!("  t={t:>4.1}s  width={:+.3}", timeline.value_at(t));
        }
    }

    ctx.host_mut().advance_to(4.0);
    let events = ctx.process_events()?;
    let freed = ctx.collect()?;
    println!("\n{events} host events, {freed} nodes collected");
    println!("{} host calls in total", ctx.host().calls().len());
    Ok(())
}
