use u3m_viewer::app::LaunchOptions;

fn main() {
    let options = LaunchOptions::from_args(std::env::args().skip(1));
    if let Err(err) = u3m_viewer::run(options) {
        eprintln!("Application error: {err}");
    }
}
