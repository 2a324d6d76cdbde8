//! Spring Trace Demo
//!
//! Drives a card through a few animation blocks headlessly and prints the
//! animated values frame by frame:
//! - a gentle spring slide that gets interrupted mid-flight
//! - an eased fade with a delay
//! - a decay fling
//!
//! Run with: cargo run -p verve_animation --example spring_trace
//! Set `RUST_LOG=verve_animation=trace` to see the runtime's own logging.

use std::cell::Cell;
use std::rc::Rc;
use verve_animation::{
    active_animation_count, animatable_property, animate, install_frame_clock, tick, Animated,
    DecayConfig, Easing, FrameTick, ManualFrameClock,
};
use verve_core::Point;

#[derive(Debug)]
struct Card {
    position: Point,
    opacity: f64,
    scroll: f64,
}

animatable_property!(fn position(Card => Point) = position);
animatable_property!(fn opacity(Card => f64) = opacity);
animatable_property!(fn scroll(Card => f64) = scroll);

struct Display {
    clock: ManualFrameClock,
    frame: Cell<u64>,
}

impl Display {
    /// Tick at 60 Hz until the scheduler stops the clock
    fn run_until_idle(&self, card: &Animated<Card>, label: &str) {
        while self.clock.is_running() {
            let frame = self.frame.get() + 1;
            self.frame.set(frame);
            tick(FrameTick::at_rate(frame, 60.0));
            if frame % 6 == 0 {
                let card = card.borrow();
                println!(
                    "{label:>8} frame {frame:4}: position=({:7.2}, {:7.2}) opacity={:.3} scroll={:8.2}",
                    card.position.x, card.position.y, card.opacity, card.scroll
                );
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let display = Display {
        clock: ManualFrameClock::new(),
        frame: Cell::new(0),
    };
    install_frame_clock(display.clock.clone());

    let card = Animated::new(Card {
        position: Point::ZERO,
        opacity: 0.0,
        scroll: 0.0,
    });

    let finished = Rc::new(Cell::new(0));
    let counter = finished.clone();
    animate().gentle().run_with_completion(
        || card.animator().set(position(), Point::new(200.0, 80.0)),
        move |result| {
            counter.set(counter.get() + 1);
            println!("slide completed: {result:?}");
        },
    );

    // Interrupt after a quarter second; the spring carries its velocity over
    for _ in 0..15 {
        let frame = display.frame.get() + 1;
        display.frame.set(frame);
        tick(FrameTick::at_rate(frame, 60.0));
    }
    animate()
        .wobbly()
        .run(|| card.animator().set(position(), Point::new(40.0, 160.0)));
    display.run_until_idle(&card, "slide");

    animate()
        .with_easing(Easing::EaseOutCubic)
        .with_duration(0.4)
        .with_delay(0.1)
        .run(|| card.animator().set(opacity(), 1.0));
    display.run_until_idle(&card, "fade");

    animate()
        .with_decay(DecayConfig::NORMAL)
        .run(|| card.animator().set_velocity(scroll(), 1500.0));
    display.run_until_idle(&card, "fling");

    println!(
        "done after {} frames, {} active animations, slide completions: {}",
        display.frame.get(),
        active_animation_count(),
        finished.get()
    );
    println!("final card: {:?}", card.borrow());
}
