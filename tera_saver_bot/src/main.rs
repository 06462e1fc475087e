use saver_bot_commons::*;

fn main() {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "WARNING,tera_saver_bot=debug");
    }
    start_everything(tera_saver_bot::entry());
}
