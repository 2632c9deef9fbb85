//! Custody, connector and gateway contract ABIs
//!
//! Uses alloy's sol! macro to generate type-safe event decoders and call
//! encoders. Only the events the observer parses and the functions the
//! signer calls are declared.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// Context handed to a contract called by the gateway
    struct MessageContext {
        address sender;
    }

    /// Revert preferences a user attaches to a gateway inbound
    struct RevertOptions {
        address revertAddress;
        bool callOnRevert;
        address abortAddress;
        bytes revertMessage;
        uint256 onRevertGasLimit;
    }

    /// Context handed to a revert address on callback
    struct RevertContext {
        address sender;
        address asset;
        uint256 amount;
        bytes revertMessage;
    }

    /// ERC20 custody holding deposited tokens for the TSS
    interface ERC20Custody {
        /// Emitted on user deposit. `recipient` is an address on the consensus chain.
        event Deposited(bytes recipient, address indexed asset, uint256 amount, bytes message);

        /// Emitted on TSS withdraw
        event Withdrawn(address indexed recipient, address indexed asset, uint256 amount);

        /// Emitted by `withdrawAndCall` once the gateway call returned
        event WithdrawnAndCalled(address indexed to, address indexed token, uint256 amount, bytes data);

        function withdraw(address recipient, address asset, uint256 amount) external;

        function withdrawAndCall(
            MessageContext messageContext,
            address to,
            address token,
            uint256 amount,
            bytes data
        ) external;

        function withdrawAndRevert(
            address to,
            address token,
            uint256 amount,
            bytes data,
            RevertContext revertContext
        ) external;
    }

    /// Message-passing connector for the native protocol token
    interface ZetaConnector {
        event ZetaSent(
            address sourceTxOriginAddress,
            address indexed zetaTxSenderAddress,
            uint256 indexed destinationChainId,
            bytes destinationAddress,
            uint256 zetaValueAndGas,
            uint256 destinationGasLimit,
            bytes message,
            bytes zetaParams
        );

        /// Emitted by `onReceive` on the destination chain
        event ZetaReceived(
            bytes zetaTxSenderAddress,
            uint256 indexed sourceChainId,
            address indexed destinationAddress,
            uint256 zetaValue,
            bytes message,
            bytes32 indexed internalSendHash
        );

        /// Emitted by `onRevert` on the source chain
        event ZetaReverted(
            address zetaTxSenderAddress,
            uint256 sourceChainId,
            uint256 indexed destinationChainId,
            bytes destinationAddress,
            uint256 remainingZetaValue,
            bytes message,
            bytes32 indexed internalSendHash
        );

        function onReceive(
            bytes zetaTxSenderAddress,
            uint256 sourceChainId,
            address destinationAddress,
            uint256 zetaValue,
            bytes message,
            bytes32 internalSendHash
        ) external;

        function onRevert(
            address zetaTxSenderAddress,
            uint256 sourceChainId,
            bytes destinationAddress,
            uint256 destinationChainId,
            uint256 remainingZetaValue,
            bytes message,
            bytes32 internalSendHash
        ) external;
    }

    /// Protocol gateway for arbitrary calls and revert callbacks
    interface GatewayEVM {
        event Deposited(
            address indexed sender,
            address indexed receiver,
            uint256 amount,
            address asset,
            bytes payload,
            RevertOptions revertOptions
        );

        event DepositedAndCalled(
            address indexed sender,
            address indexed receiver,
            uint256 amount,
            address asset,
            bytes payload,
            RevertOptions revertOptions
        );

        event Called(
            address indexed sender,
            address indexed receiver,
            bytes payload,
            RevertOptions revertOptions
        );

        /// Emitted by `execute`
        event Executed(address indexed destination, uint256 value, bytes data);

        /// Emitted by `executeRevert` and the custody revert path
        event Reverted(
            address indexed to,
            address indexed token,
            uint256 amount,
            bytes data,
            RevertContext revertContext
        );

        function execute(MessageContext messageContext, address destination, bytes data)
            external
            payable
            returns (bytes);

        function executeRevert(address destination, bytes data, RevertContext revertContext)
            external
            payable;
    }
}
