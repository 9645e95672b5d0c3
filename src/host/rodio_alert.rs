use std::{
    fs::File,
    io::BufReader,
    sync::{Mutex, MutexGuard, PoisonError},
    thread,
    time::Duration,
};

use crossbeam_channel::{bounded, Sender};
use log::{debug, info, warn};
use rodio::{source::SineWave, Decoder, OutputStreamBuilder, Sink, Source};

use super::AlertOutput;
use crate::{config::AlertProfile, error::AlertOutputFailure};

const BEEP_HZ: f32 = 880.0;
const BEEP_LENGTH: Duration = Duration::from_millis(500);

/// what the audio thread plays
#[derive(Debug)]
enum Tune {
    File(File),
    /// built in beep for when the configured sound isn't usable
    Beep,
}

impl Tune {
    fn open(profile: &AlertProfile) -> Self {
        match File::open(&profile.sound.path) {
            Ok(file) => Self::File(file),
            Err(e) => {
                warn!(
                    "couldn't open {} ({}): {e}, using the built in beep",
                    profile.sound,
                    profile.sound.path.display()
                );
                Self::Beep
            }
        }
    }
}

/// half a second of tone, half a second of silence, forever
fn beep() -> impl Source + Send + 'static {
    SineWave::new(BEEP_HZ)
        .take_duration(BEEP_LENGTH)
        .delay(BEEP_LENGTH)
        .repeat_infinite()
}

#[derive(Debug, Default)]
struct Playing {
    /// sessions that started the alert and haven't stopped it yet
    active: usize,
    stop: Option<Sender<()>>,
}

/// loops the configured sound on a dedicated audio thread
///
/// Several alarms ringing at once share one playback, it stops when the last of them stops.
#[derive(Debug, Default)]
pub struct RodioAlert {
    playing: Mutex<Playing>,
}

impl RodioAlert {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Playing> {
        self.playing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_player(profile: &AlertProfile) -> Result<Sender<()>, AlertOutputFailure> {
        let tune = Tune::open(profile);
        let name = profile.sound.name.clone();
        let volume = profile.volume / 100.0;
        let (ready_tx, ready_rx) = bounded::<Result<(), AlertOutputFailure>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        thread::Builder::new()
            .name("alarm-sound".to_string())
            .spawn(move || {
                let stream = match OutputStreamBuilder::open_default_stream() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AlertOutputFailure::Device(e.to_string())));
                        return;
                    }
                };
                let sink = Sink::connect_new(stream.mixer());
                sink.set_volume(volume);
                // create source that repeatedly plays the sound at the configured volume
                match tune {
                    Tune::File(file) => match Decoder::new(BufReader::new(file)) {
                        Ok(decoder) => sink.append(decoder.repeat_infinite()),
                        Err(e) => {
                            warn!("couldn't decode {name}: {e}, using the built in beep");
                            sink.append(beep());
                        }
                    },
                    Tune::Beep => sink.append(beep()),
                }
                sink.play();
                let _ = ready_tx.send(Ok(()));
                // wakes up on stop or when the sender is dropped
                let _ = stop_rx.recv();
                sink.stop();
            })
            .map_err(|e| AlertOutputFailure::Device(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| AlertOutputFailure::Disconnected)??;
        Ok(stop_tx)
    }
}

impl AlertOutput for RodioAlert {
    fn start_alert(&self, profile: &AlertProfile) -> Result<(), AlertOutputFailure> {
        let mut playing = self.lock();
        playing.active += 1;
        if playing.stop.is_some() {
            debug!("alarm sound already playing");
            return Ok(());
        }
        debug!(
            "no vibration motor, skipping pattern {:?}",
            profile.vibration
        );
        let stop = Self::spawn_player(profile)?;
        info!("playing {}", profile.sound);
        playing.stop = Some(stop);
        Ok(())
    }

    fn stop_alert(&self) {
        let mut playing = self.lock();
        playing.active = playing.active.saturating_sub(1);
        if playing.active == 0 {
            if let Some(stop) = playing.stop.take() {
                let _ = stop.send(());
                info!("alarm sound stopped");
            }
        }
    }
}
