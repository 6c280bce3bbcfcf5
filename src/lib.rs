pub mod cli;
pub mod config;
pub mod http_client;
pub mod odoo_client;
pub mod services;
pub mod shell;
pub mod xmlrpc;
