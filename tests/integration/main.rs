//! Integration tests: the desk driven end to end against a scripted odds
//! source and a real account store on disk.

mod desk_flow;
mod mock_odds;
