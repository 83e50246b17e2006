pub mod server;

#[derive(Debug)]
pub enum Action {
    Server { args: server::Args },
}
