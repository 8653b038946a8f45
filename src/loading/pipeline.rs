use std::collections::VecDeque;

use image::Rgba32FImage;

use crate::archive::ArchiveContents;
use crate::environment::{bake_environment, decode_panorama, BakedEnvironment};
use crate::error::Result;
use crate::io::ResourceFetcher;
use crate::loading::tracker::{Generation, LoadKind, LoadTicket};
use crate::material::{parse_archive, MaterialArchiveBundle, MaterialDefinition, TextureImage};
use crate::scene::model::{import_model, sphere_model, ModelData, ModelSource};

#[derive(Debug, Clone)]
pub enum LoadRequest {
    Model {
        source: ModelSource,
    },
    Environment {
        index: usize,
        path: String,
        max_width: u32,
    },
    MaterialArchive {
        path: String,
    },
    /// Fetch and decode every unresolved texture slot of a definition.
    MaterialTextures {
        definition: MaterialDefinition,
    },
}

impl LoadRequest {
    pub fn kind(&self) -> LoadKind {
        match self {
            LoadRequest::Model { .. } => LoadKind::Model,
            LoadRequest::Environment { .. } => LoadKind::Environment,
            LoadRequest::MaterialArchive { .. } => LoadKind::MaterialArchive,
            LoadRequest::MaterialTextures { .. } => LoadKind::MaterialTextures,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadJob {
    pub ticket: LoadTicket,
    pub generation: Generation,
    pub request: LoadRequest,
}

#[derive(Debug, Clone)]
pub enum LoadOutput {
    Model(ModelData),
    Environment {
        index: usize,
        baked: BakedEnvironment,
    },
    Archive(MaterialArchiveBundle),
    Material(MaterialDefinition),
}

/// Result of one finished job, tagged so stale results can be recognised.
#[derive(Debug, Clone)]
pub struct Completion {
    pub ticket: LoadTicket,
    pub kind: LoadKind,
    pub generation: Generation,
    pub result: Result<LoadOutput>,
}

/// Where a queued job stands. Each step does one fetch, decode or bake and
/// either finishes the job or hands back the next stage.
enum Stage {
    Start(LoadRequest),
    ImportModel {
        label: String,
        bytes: Vec<u8>,
    },
    BakePanorama {
        index: usize,
        label: String,
        max_width: u32,
        image: Rgba32FImage,
    },
    ParseArchive {
        contents: ArchiveContents,
    },
    ResolveTextures {
        definition: MaterialDefinition,
        dropped: usize,
    },
}

enum Step {
    Done(Result<LoadOutput>),
    Next(Stage),
}

struct QueuedJob {
    ticket: LoadTicket,
    generation: Generation,
    kind: LoadKind,
    stage: Stage,
}

/// FIFO of load jobs executed on the caller's thread, one stage per step.
///
/// A job runs to completion before the next one starts; its later stages go
/// back to the front of the queue.
pub struct AssetLoader<F> {
    fetcher: F,
    queue: VecDeque<QueuedJob>,
}

impl<F: ResourceFetcher> AssetLoader<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            queue: VecDeque::new(),
        }
    }

    pub fn enqueue(&mut self, job: LoadJob) {
        let kind = job.request.kind();
        log::info!("Queued {} load (ticket {})", kind.label(), job.ticket.value());
        self.queue.push_back(QueuedJob {
            ticket: job.ticket,
            generation: job.generation,
            kind,
            stage: Stage::Start(job.request),
        });
    }

    /// Jobs not yet finished, including one that is part way through.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drops queued jobs without running them and returns their tickets.
    pub fn clear(&mut self) -> Vec<LoadTicket> {
        self.queue.drain(..).map(|job| job.ticket).collect()
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Runs at most `budget` steps and returns the jobs that finished.
    pub fn pump(&mut self, budget: usize) -> Vec<Completion> {
        let mut completions = Vec::new();

        for _ in 0..budget {
            let Some(job) = self.queue.pop_front() else {
                break;
            };

            let result = match self.step(job.stage) {
                Step::Next(stage) => {
                    log::trace!(
                        "{} load (ticket {}) continues",
                        job.kind.label(),
                        job.ticket.value()
                    );
                    self.queue.push_front(QueuedJob {
                        ticket: job.ticket,
                        generation: job.generation,
                        kind: job.kind,
                        stage,
                    });
                    continue;
                }
                Step::Done(result) => result,
            };

            match &result {
                Ok(_) => log::info!(
                    "Finished {} load (ticket {})",
                    job.kind.label(),
                    job.ticket.value()
                ),
                Err(err) => log::error!(
                    "Failed {} load (ticket {}): {}",
                    job.kind.label(),
                    job.ticket.value(),
                    err
                ),
            }

            completions.push(Completion {
                ticket: job.ticket,
                kind: job.kind,
                generation: job.generation,
                result,
            });
        }

        completions
    }

    fn step(&self, stage: Stage) -> Step {
        match self.try_step(stage) {
            Ok(step) => step,
            Err(err) => Step::Done(Err(err)),
        }
    }

    fn try_step(&self, stage: Stage) -> Result<Step> {
        let step = match stage {
            Stage::Start(LoadRequest::Model { source }) => match source {
                ModelSource::File(path) => {
                    let bytes = self.fetcher.fetch(&path)?;
                    Step::Next(Stage::ImportModel { label: path, bytes })
                }
                ModelSource::Sphere => Step::Done(Ok(LoadOutput::Model(sphere_model(64, 32)))),
            },
            Stage::ImportModel { label, bytes } => {
                Step::Done(Ok(LoadOutput::Model(import_model(&bytes, &label)?)))
            }
            Stage::Start(LoadRequest::Environment {
                index,
                path,
                max_width,
            }) => {
                let bytes = self.fetcher.fetch(&path)?;
                let image = decode_panorama(&bytes, &path)?;
                Step::Next(Stage::BakePanorama {
                    index,
                    label: path,
                    max_width,
                    image,
                })
            }
            Stage::BakePanorama {
                index,
                label,
                max_width,
                image,
            } => {
                let baked = bake_environment(image, max_width, &label);
                Step::Done(Ok(LoadOutput::Environment { index, baked }))
            }
            Stage::Start(LoadRequest::MaterialArchive { path }) => {
                let bytes = self.fetcher.fetch(&path)?;
                let contents = ArchiveContents::from_bytes(&bytes)?;
                Step::Next(Stage::ParseArchive { contents })
            }
            Stage::ParseArchive { contents } => {
                Step::Done(Ok(LoadOutput::Archive(parse_archive(&contents))))
            }
            Stage::Start(LoadRequest::MaterialTextures { definition }) => {
                self.resolve_texture(definition, 0)
            }
            Stage::ResolveTextures {
                definition,
                dropped,
            } => self.resolve_texture(definition, dropped),
        };
        Ok(step)
    }

    /// Resolves the next unresolved map of `definition`.
    fn resolve_texture(&self, definition: MaterialDefinition, dropped: usize) -> Step {
        let (resolved, failures) = definition.resolve_with_limit(1, |_, path| {
            let bytes = self.fetcher.fetch(path)?;
            TextureImage::decode(&bytes, path)
        });
        let dropped = dropped + failures.len();

        if !resolved.is_resolved() {
            return Step::Next(Stage::ResolveTextures {
                definition: resolved,
                dropped,
            });
        }

        if dropped > 0 {
            log::debug!(
                "'{}' resolved with {} absent map(s)",
                resolved.name(),
                dropped
            );
        }
        Step::Done(Ok(LoadOutput::Material(resolved)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFetcher;
    use crate::loading::tracker::{GenerationCounter, LoadingTracker};
    use crate::material::{Channel, MaterialSource, TextureSlot};
    use crate::error::ViewerError;
    use std::time::Duration;

    fn png() -> Vec<u8> {
        let mut bytes = Vec::new();
        image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 0, 0, 255]))
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn job(tracker: &mut LoadingTracker, generation: Generation, request: LoadRequest) -> LoadJob {
        LoadJob {
            ticket: tracker.begin(request.kind()),
            generation,
            request,
        }
    }

    #[test]
    fn pump_respects_budget_and_order() {
        let mut tracker = LoadingTracker::new(Duration::ZERO);
        let mut generations = GenerationCounter::new();
        let mut loader = AssetLoader::new(MemoryFetcher::new());

        let first = job(
            &mut tracker,
            generations.advance(),
            LoadRequest::Model { source: "a.glb".into() },
        );
        let first_ticket = first.ticket;
        loader.enqueue(first);
        loader.enqueue(job(
            &mut tracker,
            generations.advance(),
            LoadRequest::MaterialArchive { path: "b.u3ma".into() },
        ));

        let done = loader.pump(1);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].ticket, first_ticket);
        assert!(matches!(
            done[0].result,
            Err(ViewerError::NetworkFailure { .. })
        ));
        assert_eq!(loader.pending(), 1);

        assert_eq!(loader.pump(8).len(), 1);
        assert!(loader.is_idle());
    }

    #[test]
    fn texture_job_resolves_slots_and_drops_failures() {
        let fetcher = MemoryFetcher::new().with("maps/red.png", png());
        let mut loader = AssetLoader::new(fetcher);
        let mut tracker = LoadingTracker::new(Duration::ZERO);

        let definition = MaterialDefinition::new("Denim", MaterialSource::Procedural)
            .with_map(Channel::Albedo, TextureSlot::from_path("maps/red.png"))
            .with_map(Channel::Normal, TextureSlot::from_path("maps/missing.png"));

        loader.enqueue(job(
            &mut tracker,
            Generation::default(),
            LoadRequest::MaterialTextures { definition },
        ));

        // One map per step: the albedo resolves first, the missing normal ends the job.
        assert!(loader.pump(1).is_empty());
        assert_eq!(loader.pending(), 1);

        let done = loader.pump(1);
        let Ok(LoadOutput::Material(resolved)) = &done[0].result else {
            panic!("texture job should succeed");
        };
        assert!(resolved.is_resolved());
        assert!(resolved.has_map(Channel::Albedo));
        assert!(!resolved.has_map(Channel::Normal));
    }

    #[test]
    fn environment_bakes_on_a_later_step() {
        let fetcher = MemoryFetcher::new().with("env/studio.png", png());
        let mut loader = AssetLoader::new(fetcher);
        let mut tracker = LoadingTracker::new(Duration::ZERO);

        loader.enqueue(job(
            &mut tracker,
            Generation::default(),
            LoadRequest::Environment {
                index: 0,
                path: "env/studio.png".into(),
                max_width: 64,
            },
        ));
        loader.enqueue(job(
            &mut tracker,
            Generation::default(),
            LoadRequest::Model { source: ModelSource::Sphere },
        ));

        assert!(loader.pump(1).is_empty());
        let done = loader.pump(1);
        assert_eq!(done.len(), 1);
        assert!(matches!(
            done[0].result,
            Ok(LoadOutput::Environment { index: 0, .. })
        ));

        let done = loader.pump(1);
        assert!(matches!(done[0].result, Ok(LoadOutput::Model(_))));
        assert!(loader.is_idle());
    }

    #[test]
    fn clear_drops_a_job_part_way_through() {
        let fetcher = MemoryFetcher::new().with("env/studio.png", png());
        let mut loader = AssetLoader::new(fetcher);
        let mut tracker = LoadingTracker::new(Duration::ZERO);
        loader.enqueue(job(
            &mut tracker,
            Generation::default(),
            LoadRequest::Environment {
                index: 0,
                path: "env/studio.png".into(),
                max_width: 64,
            },
        ));

        assert!(loader.pump(1).is_empty());
        assert_eq!(loader.clear().len(), 1);
        assert!(loader.pump(4).is_empty());
    }

    #[test]
    fn clear_returns_tickets() {
        let mut loader = AssetLoader::new(MemoryFetcher::new());
        let mut tracker = LoadingTracker::new(Duration::ZERO);
        loader.enqueue(job(
            &mut tracker,
            Generation::default(),
            LoadRequest::Model { source: "x".into() },
        ));
        assert_eq!(loader.clear().len(), 1);
        assert!(loader.is_idle());
    }
}
