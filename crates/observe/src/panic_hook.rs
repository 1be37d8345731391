/// Routes panics through tracing so they show up in the structured log
/// stream before the process dies. The previous hook still runs.
pub fn install() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("thread panicked: {info}");
        previous(info);
    }));
}
