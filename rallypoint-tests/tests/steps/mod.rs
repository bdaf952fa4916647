mod heartbeat_steps;
mod lobby_steps;
mod rate_limit_steps;
mod relay_steps;
