mod entry;
mod logger;

use loadtest::error::AppResult;

fn main() -> AppResult<()> {
    entry::run()
}
