//! Will (dead-man's-switch) contract bindings

use alloy::sol;

sol! {
    /// Will contract interface
    ///
    /// The owner deposits funds, designates a recipient and pings to prove
    /// liveness. The recipient may claim once the liveness window lapses.
    #[sol(rpc)]
    interface IWill {
        /// Designate the recipient
        function setRecipient(address _recipient) external;

        /// Replace the current recipient
        function changeRecipient(address newRecipient) external;

        /// Prove liveness
        function ping() external;

        /// Add funds (payable)
        function deposit() external payable;

        /// Release funds to the recipient after the liveness window
        function claim() external;

        /// Emit a reminder event for the owner
        function triggerReminder() external;

        function owner() external view returns (address);

        function recipient() external view returns (address);

        function startTime() external view returns (uint256);

        function pingedLast() external view returns (uint256);

        /// Emitted by triggerReminder
        event remindUser(address indexed user);
    }
}
