mod helpers;

mod registration_test;
mod router_test;
mod sweep_test;
