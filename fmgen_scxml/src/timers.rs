//! Periodic timers and the global timer automaton driving them.
//!
//! Time advances in discrete steps: the global timer increments its clock `t`
//! by the GCD of the timer periods, then waits for every timer that is due
//! to be served (through the timer's rate event) before ticking again.

use fmgen_core::{
    Assignment, Automaton, AutomatonError, Destination, Edge, Expression, OpTag, Type, Variable,
};
use log::debug;
use thiserror::Error;

/// Prefix of the rate events of timers.
pub const TIMER_PREFIX: &str = "ros_time_rate.";
/// Name of the global timer automaton.
pub const GLOBAL_TIMER: &str = "global_timer";
/// Action advancing the global clock.
pub const GLOBAL_TIMER_TICK: &str = "global_timer_tick";
/// Action of the event automata's self-loops synchronized with the global tick.
pub const GLOBAL_TIMER_ENABLE: &str = "global_timer_enable";

const LOCATION: &str = "loc";
const CLOCK: &str = "t";

/// Errors in configuring timers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimerError {
    /// The rate is not a positive number.
    #[error("timer '{timer}' has invalid rate {rate}")]
    InvalidRate {
        /// The timer.
        timer: String,
        /// Its rate.
        rate: f64,
    },
    /// The period cannot be expressed as an integer in any time unit.
    #[error("period of timer '{timer}' (rate {rate} Hz) cannot be expressed as an integer")]
    Period {
        /// The timer.
        timer: String,
        /// Its rate.
        rate: f64,
    },
    /// The max time cannot be expressed exactly in the timer's time unit.
    #[error("max time {max_time_ns}ns cannot be converted to {unit:?}")]
    MaxTime {
        /// The max time in nanoseconds.
        max_time_ns: u64,
        /// The time unit of the global timer.
        unit: TimeUnit,
    },
    /// Time values do not fit the model's integers.
    #[error("time values of timer '{0}' overflow")]
    Overflow(String),
    /// No timer to drive.
    #[error("global timer requires at least one timer")]
    NoTimers,
    /// Error building the automaton.
    #[error(transparent)]
    Automaton(#[from] AutomatonError),
}

/// Units of time, from coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimeUnit {
    /// Seconds.
    S,
    /// Milliseconds.
    Ms,
    /// Microseconds.
    Us,
    /// Nanoseconds.
    Ns,
}

impl TimeUnit {
    const ALL: [TimeUnit; 4] = [TimeUnit::S, TimeUnit::Ms, TimeUnit::Us, TimeUnit::Ns];

    // Units per second, as a power of 1000.
    fn exponent(self) -> u32 {
        match self {
            TimeUnit::S => 0,
            TimeUnit::Ms => 1,
            TimeUnit::Us => 2,
            TimeUnit::Ns => 3,
        }
    }

    /// Converts `value` from `from` units to `self` units,
    /// if the conversion is exact.
    pub fn convert(self, value: u64, from: TimeUnit) -> Option<u64> {
        if self >= from {
            value.checked_mul(1000u64.pow(self.exponent() - from.exponent()))
        } else {
            let factor = 1000u64.pow(from.exponent() - self.exponent());
            (value % factor == 0).then_some(value / factor)
        }
    }
}

/// A periodic timer.
#[derive(Debug, Clone, PartialEq)]
pub struct Timer {
    /// Name of the timer.
    pub name: String,
    /// Rate, in Hz.
    pub rate: f64,
}

impl Timer {
    /// Creates a new timer.
    pub fn new(name: impl Into<String>, rate: f64) -> Self {
        Self {
            name: name.into(),
            rate,
        }
    }

    /// The event the timer fires at every period.
    pub fn rate_event(&self) -> String {
        format!("{TIMER_PREFIX}{}", self.name)
    }

    /// The period as an integer in the coarsest unit representing it exactly,
    /// or the first unit where it exceeds 100 (truncating the rest).
    ///
    /// ```
    /// # use fmgen_scxml::{Timer, TimeUnit};
    /// assert_eq!(Timer::new("a", 1.0).period(), Ok((1, TimeUnit::S)));
    /// assert_eq!(Timer::new("b", 4.0).period(), Ok((250, TimeUnit::Ms)));
    /// assert_eq!(Timer::new("c", 3.0).period(), Ok((333, TimeUnit::Ms)));
    /// ```
    pub fn period(&self) -> Result<(u64, TimeUnit), TimerError> {
        if !(self.rate.is_finite() && self.rate > 0.) {
            return Err(TimerError::InvalidRate {
                timer: self.name.clone(),
                rate: self.rate,
            });
        }
        for unit in TimeUnit::ALL {
            let period = f64::from(1000u32.pow(unit.exponent())) / self.rate;
            let int_period = period.floor();
            if int_period == period || int_period > 100. {
                return Ok((int_period as u64, unit));
            }
        }
        Err(TimerError::Period {
            timer: self.name.clone(),
            rate: self.rate,
        })
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn int(value: u64, timer: &str) -> Result<Expression, TimerError> {
    i64::try_from(value)
        .map(Expression::from)
        .map_err(|_| TimerError::Overflow(timer.to_owned()))
}

/// Builds the global timer automaton driving the given timers up to `max_time_ns`.
pub fn global_timer_automaton(timers: &[Timer], max_time_ns: u64) -> Result<Automaton, TimerError> {
    let periods = timers
        .iter()
        .map(Timer::period)
        .collect::<Result<Vec<_>, _>>()?;
    let unit = periods
        .iter()
        .map(|(_, unit)| *unit)
        .max()
        .ok_or(TimerError::NoTimers)?;
    let mut periods_in_unit = Vec::with_capacity(timers.len());
    for (timer, (period, from)) in timers.iter().zip(&periods) {
        let period = unit
            .convert(*period, *from)
            .ok_or_else(|| TimerError::Overflow(timer.name.clone()))?;
        periods_in_unit.push(period);
    }
    let step = periods_in_unit.iter().copied().fold(0, gcd);
    let max_time = unit
        .convert(max_time_ns, TimeUnit::Ns)
        .ok_or(TimerError::MaxTime { max_time_ns, unit })?;
    debug!("global timer: step {step} {unit:?}, max time {max_time} {unit:?}");

    let mut automaton = Automaton::new(GLOBAL_TIMER);
    automaton.add_location(LOCATION);
    automaton.make_initial(LOCATION)?;
    automaton.add_variable(Variable::new(CLOCK, Type::Int, Some(0i64.into()), false))?;
    let clock = Expression::identifier(CLOCK);

    let mut guard = Expression::binary(OpTag::Less, clock.clone(), int(max_time, GLOBAL_TIMER)?);
    let mut tick = Destination::new(LOCATION).with_assignment(Assignment::new(
        CLOCK,
        Expression::binary(OpTag::Add, clock.clone(), int(step, GLOBAL_TIMER)?),
        0,
    ));
    for (idx, (timer, period)) in timers.iter().zip(periods_in_unit).enumerate() {
        let needed = format!("{}_needed", timer.name);
        automaton.add_variable(Variable::new(
            needed.as_str(),
            Type::Bool,
            Some(true.into()),
            false,
        ))?;
        guard = guard.and(!Expression::identifier(needed.as_str()));
        let due = Expression::binary(
            OpTag::Equal,
            Expression::binary(OpTag::Mod, clock.clone(), int(period, &timer.name)?),
            0i64.into(),
        );
        let index = u32::try_from(idx + 1).map_err(|_| TimerError::Overflow(timer.name.clone()))?;
        tick = tick.with_assignment(Assignment::new(needed, due, index));
    }
    automaton.add_edge(
        Edge::new(LOCATION, tick)
            .with_action(GLOBAL_TIMER_TICK)
            .with_guard(guard),
    )?;

    for timer in timers {
        let needed = format!("{}_needed", timer.name);
        automaton.add_edge(
            Edge::new(
                LOCATION,
                Destination::new(LOCATION)
                    .with_assignment(Assignment::new(needed.as_str(), false.into(), 0)),
            )
            .with_action(format!("{}_on_receive", timer.rate_event()))
            .with_guard(Expression::identifier(needed)),
        )?;
    }
    Ok(automaton)
}
