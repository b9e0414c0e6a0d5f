//! Simulated sign-in flow shown before entering the studio.
//!
//! Nothing is authenticated: the flow only walks through its screens with
//! fixed pauses. Choosing Google animates a redirect progress bar first;
//! email or skip enter the studio immediately.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

/// Largest progress increment per redirect tick, in percent.
pub const MAX_PROGRESS_STEP: f64 = 15.0;

/// Screen of the sign-in flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    /// Provider choice.
    Choice,
    /// Simulated redirect to the provider.
    Redirecting,
    /// Simulated account handshake.
    Handshake,
    /// Access granted banner.
    Granted,
    /// Flow finished; the studio is open.
    Done,
}

impl AuthStep {
    /// Screen headline.
    pub fn headline(self) -> &'static str {
        match self {
            Self::Choice => "Neural Link",
            Self::Redirecting => "Moving to Google Sign-in",
            Self::Handshake => "Handshake Successful",
            Self::Granted => "Access Granted",
            Self::Done => "Sarjo AI Studio",
        }
    }

    /// Status line under the headline.
    pub fn status(self) -> &'static str {
        match self {
            Self::Choice => "Uplink to Sarjo AI Studio Core",
            Self::Redirecting => "Establishing Secure Tunnel",
            Self::Handshake => "Syncing Real Account Data",
            Self::Granted => "Sarjo Neural Link Ready",
            Self::Done => "",
        }
    }

    /// Longer description.
    pub fn detail(self) -> &'static str {
        match self {
            Self::Redirecting => "Connecting to accounts.google.com via encrypted gateway...",
            Self::Handshake => "Identity verified. Uploading user profile to Studio Core...",
            Self::Granted => "Welcome to the future of creation, Master.",
            Self::Choice | Self::Done => "",
        }
    }
}

/// How the user leaves the choice screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChoice {
    /// "Sign up with Google".
    Google,
    /// "Continue with Email".
    Email,
    /// "Skip Authorization".
    Skip,
}

/// Pauses between screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthTimings {
    /// Interval between redirect progress ticks.
    pub tick: Duration,
    /// Pause after the progress bar fills.
    pub settle: Duration,
    /// Time on the handshake screen.
    pub handshake: Duration,
    /// Time on the granted screen.
    pub granted: Duration,
}

impl Default for AuthTimings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(150),
            settle: Duration::from_millis(400),
            handshake: Duration::from_millis(1500),
            granted: Duration::from_millis(1200),
        }
    }
}

impl AuthTimings {
    /// No pauses at all.
    pub fn immediate() -> Self {
        Self {
            tick: Duration::ZERO,
            settle: Duration::ZERO,
            handshake: Duration::ZERO,
            granted: Duration::ZERO,
        }
    }
}

/// State of the sign-in flow.
#[derive(Debug, Clone, PartialEq)]
pub struct SignInFlow {
    step: AuthStep,
    progress: f64,
}

impl Default for SignInFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl SignInFlow {
    /// A flow on the choice screen.
    pub fn new() -> Self {
        Self {
            step: AuthStep::Choice,
            progress: 0.0,
        }
    }

    /// Current screen.
    pub fn step(&self) -> AuthStep {
        self.step
    }

    /// Redirect progress, 0..=100.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Leave the choice screen. Ignored on any other screen.
    pub fn choose(&mut self, choice: AuthChoice) {
        if self.step != AuthStep::Choice {
            return;
        }
        self.step = match choice {
            AuthChoice::Google => AuthStep::Redirecting,
            AuthChoice::Email | AuthChoice::Skip => AuthStep::Done,
        };
    }

    /// Add `increment` percent of redirect progress, capped at 100.
    ///
    /// Returns `true` once the bar is full.
    pub fn advance(&mut self, increment: f64) -> bool {
        if self.step != AuthStep::Redirecting {
            return false;
        }
        self.progress = (self.progress + increment.max(0.0)).min(100.0);
        self.progress >= 100.0
    }

    /// Move to the screen after the current one.
    ///
    /// The redirect screen only moves on once its bar is full.
    pub fn next_step(&mut self) {
        self.step = match self.step {
            AuthStep::Redirecting if self.progress < 100.0 => AuthStep::Redirecting,
            AuthStep::Redirecting => AuthStep::Handshake,
            AuthStep::Handshake => AuthStep::Granted,
            AuthStep::Granted | AuthStep::Done => AuthStep::Done,
            AuthStep::Choice => AuthStep::Choice,
        };
    }
}

/// Drive the flow to completion, reporting every change to `observer`.
pub async fn run_flow<R, F>(choice: AuthChoice, timings: AuthTimings, rng: &mut R, mut observer: F)
where
    R: Rng + Send,
    F: FnMut(&SignInFlow) + Send,
{
    let mut flow = SignInFlow::new();
    observer(&flow);
    flow.choose(choice);
    observer(&flow);

    if flow.step() == AuthStep::Redirecting {
        loop {
            tokio::time::sleep(timings.tick).await;
            let full = flow.advance(rng.gen_range(0.0..MAX_PROGRESS_STEP));
            observer(&flow);
            if full {
                break;
            }
        }
        tokio::time::sleep(timings.settle).await;
        flow.next_step();
        observer(&flow);

        tokio::time::sleep(timings.handshake).await;
        flow.next_step();
        observer(&flow);

        tokio::time::sleep(timings.granted).await;
        flow.next_step();
        observer(&flow);
    }
    debug!(?choice, "sign-in flow finished");
}

/// Run the flow in the terminal with an `indicatif` progress bar.
pub async fn sign_in(choice: AuthChoice, timings: AuthTimings) {
    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("  {msg:<28} [{bar:30}] {pos:>3}%") {
        bar.set_style(style);
    }
    let mut rng = StdRng::from_entropy();
    let mut last_step = None;
    run_flow(choice, timings, &mut rng, |flow| {
        let step = flow.step();
        if last_step != Some(step) {
            last_step = Some(step);
            bar.set_message(step.headline());
            let detail = step.detail();
            if !detail.is_empty() {
                bar.println(format!("  {} :: {detail}", step.status()));
            }
        }
        bar.set_position(flow.progress() as u64);
    })
    .await;
    bar.finish_and_clear();
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn email_and_skip_jump_to_done() {
        for choice in [AuthChoice::Email, AuthChoice::Skip] {
            let mut flow = SignInFlow::new();
            flow.choose(choice);
            assert_eq!(flow.step(), AuthStep::Done);
        }
    }

    #[test]
    fn progress_is_capped_at_one_hundred() {
        let mut flow = SignInFlow::new();
        flow.choose(AuthChoice::Google);
        assert!(!flow.advance(60.0));
        assert!(flow.advance(60.0));
        assert_eq!(flow.progress(), 100.0);
    }

    #[test]
    fn redirect_waits_for_full_bar() {
        let mut flow = SignInFlow::new();
        flow.choose(AuthChoice::Google);
        flow.advance(10.0);
        flow.next_step();
        assert_eq!(flow.step(), AuthStep::Redirecting);
        flow.advance(90.0);
        flow.next_step();
        assert_eq!(flow.step(), AuthStep::Handshake);
        flow.next_step();
        assert_eq!(flow.step(), AuthStep::Granted);
        flow.next_step();
        assert_eq!(flow.step(), AuthStep::Done);
    }

    #[test]
    fn choose_is_ignored_after_leaving_choice() {
        let mut flow = SignInFlow::new();
        flow.choose(AuthChoice::Google);
        flow.choose(AuthChoice::Skip);
        assert_eq!(flow.step(), AuthStep::Redirecting);
    }

    #[tokio::test]
    async fn google_flow_visits_every_screen_in_order() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut steps = Vec::new();
        let mut max_progress: f64 = 0.0;
        run_flow(AuthChoice::Google, AuthTimings::immediate(), &mut rng, |flow| {
            if steps.last() != Some(&flow.step()) {
                steps.push(flow.step());
            }
            max_progress = max_progress.max(flow.progress());
        })
        .await;
        assert_eq!(
            steps,
            vec![
                AuthStep::Choice,
                AuthStep::Redirecting,
                AuthStep::Handshake,
                AuthStep::Granted,
                AuthStep::Done
            ]
        );
        assert_eq!(max_progress, 100.0);
    }

    #[tokio::test]
    async fn skip_flow_never_redirects() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut steps = Vec::new();
        run_flow(AuthChoice::Skip, AuthTimings::immediate(), &mut rng, |flow| {
            steps.push(flow.step());
        })
        .await;
        assert_eq!(steps, vec![AuthStep::Choice, AuthStep::Done]);
    }
}
