pub mod app;
pub mod archive;
pub mod catalog;
pub mod engine;
pub mod environment;
pub mod error;
pub mod io;
pub mod loading;
pub mod material;
pub mod renderer;
pub mod scene;
pub mod settings;

use app::{App, LaunchOptions};
use catalog::Catalog;
use settings::ViewerSettings;
use winit::event_loop::EventLoop;

pub use error::{Result, ViewerError};

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

pub fn run(options: LaunchOptions) -> std::result::Result<(), winit::error::EventLoopError> {
    init_logging();

    log::info!("Starting U3M viewer");

    let settings = ViewerSettings::load();
    let catalog = Catalog::load_from_path(&settings.catalog_path);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(settings, catalog, options);

    let result = event_loop.run_app(&mut app);

    if let Err(ref err) = result {
        log::error!("Application error: {}", err);
    }

    log::info!("Application shutdown complete");

    result
}
